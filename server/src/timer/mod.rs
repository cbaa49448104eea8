//! Turn Timer (§4.4).
//!
//! Deliberately NOT ticked inline inside the session actor's `select!`
//! loop the way the teacher's `TimerState::tick` was: each session spawns
//! its own timer task here, which owns the authoritative remaining-seconds
//! state and posts `TimerTick`/`TimerExpired` commands back into the
//! session's own command queue once a second. The session actor treats
//! those exactly like any client command — it never touches a clock
//! directly.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use xiangqi::Color;

use crate::session::commands::SessionCommand;

#[derive(Debug)]
enum TimerControl {
    Start {
        active: Color,
        red_seconds: u32,
        black_seconds: u32,
    },
    Pause,
    Resume,
    /// A move was made: `reset` is the mover's color and the full
    /// turn-timeout to reset it to; `active` becomes the new ticking side.
    Switch {
        active: Color,
        reset: Option<(Color, u32)>,
    },
    Stop,
}

/// Cheap, cloneable handle to a running timer task.
#[derive(Clone)]
pub struct TimerHandle {
    control_tx: mpsc::Sender<TimerControl>,
}

impl TimerHandle {
    pub async fn start(&self, active: Color, red_seconds: u32, black_seconds: u32) {
        let _ = self
            .control_tx
            .send(TimerControl::Start { active, red_seconds, black_seconds })
            .await;
    }

    pub async fn pause(&self) {
        let _ = self.control_tx.send(TimerControl::Pause).await;
    }

    pub async fn resume(&self) {
        let _ = self.control_tx.send(TimerControl::Resume).await;
    }

    pub async fn switch(&self, active: Color, reset: Option<(Color, u32)>) {
        let _ = self.control_tx.send(TimerControl::Switch { active, reset }).await;
    }

    pub async fn stop(&self) {
        let _ = self.control_tx.send(TimerControl::Stop).await;
    }
}

/// Spawns the timer task for one session. `session_cmd_tx` is that
/// session's own command queue; this task never holds any session state
/// beyond the two remaining-seconds counters.
pub fn spawn(session_cmd_tx: mpsc::Sender<SessionCommand>, turn_timeout_seconds: u32) -> TimerHandle {
    let (control_tx, control_rx) = mpsc::channel(8);
    tokio::spawn(run(control_rx, session_cmd_tx, turn_timeout_seconds));
    TimerHandle { control_tx }
}

struct State {
    red_seconds: u32,
    black_seconds: u32,
    active: Option<Color>,
    paused: Option<Color>,
}

async fn run(
    mut control_rx: mpsc::Receiver<TimerControl>,
    session_cmd_tx: mpsc::Sender<SessionCommand>,
    turn_timeout_seconds: u32,
) {
    let mut state = State {
        red_seconds: turn_timeout_seconds,
        black_seconds: turn_timeout_seconds,
        active: None,
        paused: None,
    };
    let mut tick = time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            ctrl = control_rx.recv() => {
                match ctrl {
                    None | Some(TimerControl::Stop) => break,
                    Some(TimerControl::Start { active, red_seconds, black_seconds }) => {
                        state.red_seconds = red_seconds;
                        state.black_seconds = black_seconds;
                        state.active = Some(active);
                        state.paused = None;
                        tick.reset();
                    }
                    Some(TimerControl::Pause) => {
                        state.paused = state.active.take();
                    }
                    Some(TimerControl::Resume) => {
                        state.active = state.paused.take();
                        tick.reset();
                    }
                    Some(TimerControl::Switch { active, reset }) => {
                        if let Some((color, seconds)) = reset {
                            match color {
                                Color::Red => state.red_seconds = seconds,
                                Color::Black => state.black_seconds = seconds,
                            }
                        }
                        state.active = Some(active);
                        state.paused = None;
                        tick.reset();
                    }
                }
            }

            _ = tick.tick(), if state.active.is_some() => {
                let active = state.active.expect("guarded by select");
                match active {
                    Color::Red => state.red_seconds = state.red_seconds.saturating_sub(1),
                    Color::Black => state.black_seconds = state.black_seconds.saturating_sub(1),
                }
                let expired = match active {
                    Color::Red => state.red_seconds == 0,
                    Color::Black => state.black_seconds == 0,
                };
                let sent = if expired {
                    state.active = None;
                    session_cmd_tx.send(SessionCommand::TimerExpired { color: active }).await
                } else {
                    session_cmd_tx
                        .send(SessionCommand::TimerTick {
                            red_seconds: state.red_seconds,
                            black_seconds: state.black_seconds,
                        })
                        .await
                };
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn ticks_down_the_active_side_once_per_second() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let handle = spawn(cmd_tx, 3);
        handle.start(Color::Red, 2, 2).await;

        let tick = tokio::time::timeout(Duration::from_secs(2), cmd_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match tick {
            SessionCommand::TimerTick { red_seconds, black_seconds } => {
                assert_eq!(red_seconds, 1);
                assert_eq!(black_seconds, 2);
            }
            SessionCommand::TimerExpired { .. } => panic!("expected TimerTick, got TimerExpired"),
            _ => panic!("expected TimerTick"),
        }
        handle.stop().await;
    }

    #[tokio::test]
    async fn expiry_posts_timer_expired_and_stops_ticking() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let handle = spawn(cmd_tx, 3);
        handle.start(Color::Black, 5, 1).await;

        let event = tokio::time::timeout(Duration::from_secs(2), cmd_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SessionCommand::TimerExpired { color: Color::Black }
        ));
        handle.stop().await;
    }

    #[tokio::test]
    async fn pause_then_resume_continues_the_same_side() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let handle = spawn(cmd_tx, 3);
        handle.start(Color::Red, 5, 5).await;
        handle.pause().await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(cmd_rx.try_recv().is_err(), "paused timer must not tick");

        handle.resume().await;
        let tick = tokio::time::timeout(Duration::from_secs(2), cmd_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            tick,
            SessionCommand::TimerTick { red_seconds: 4, .. }
        ));
        handle.stop().await;
    }
}

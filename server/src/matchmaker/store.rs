//! The queue/mailbox collaborator contract (§4.2) and its default
//! in-process implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use xiangqi::Color;

/// How long a published match result stays visible to `status()` before it
/// is treated as expired. §4.2 requires "a bounded window (≥5 minutes)".
const MAILBOX_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub device_id: String,
    pub display_name: String,
    pub turn_timeout_seconds: u32,
    pub joined_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailboxEntry {
    pub game_id: String,
    pub opponent_device_id: String,
    pub opponent_name: String,
    pub assigned_color: Color,
}

pub enum QueueJoinResult {
    Waiting { position: u32 },
    Matched { opponent: QueueEntry },
}

/// The queue as an atomic collaborator: `join` both inserts the caller and
/// resolves a match in one step, so the "ordered set scored by join
/// instant" never needs a lock held across an `await` by the Matchmaker.
pub trait QueueStore: Send + Sync + 'static {
    fn contains(&self, device_id: &str) -> bool;

    /// Adds `entry`, then scans from the head skipping it. If another
    /// entry is present both are removed and returned as a match;
    /// otherwise `entry` stays queued and its 1-based rank is returned.
    fn join(&self, entry: QueueEntry) -> QueueJoinResult;

    /// Removes `device_id` if present. No-op (not an error) otherwise.
    fn leave(&self, device_id: &str);

    fn position(&self, device_id: &str) -> Option<u32>;

    /// Reinserts two entries at the head, in their original join order,
    /// after a match failed to persist.
    fn reinsert(&self, a: QueueEntry, b: QueueEntry);

    fn put_mailbox(&self, device_id: &str, entry: MailboxEntry);

    /// Non-destructive: both racing peers may observe the same match.
    fn peek_mailbox(&self, device_id: &str) -> Option<MailboxEntry>;
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<QueueEntry>,
    mailboxes: HashMap<String, (MailboxEntry, Instant)>,
}

/// Default queue backend: a `Mutex`-guarded deque plus mailbox map. Good
/// enough for a single process; a distributed deployment would swap this
/// for a shared store behind the same trait.
pub struct InMemoryQueueStore {
    inner: Mutex<Inner>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn contains(&self, device_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.queue.iter().any(|e| e.device_id == device_id)
    }

    fn join(&self, entry: QueueEntry) -> QueueJoinResult {
        let mut inner = self.inner.lock().unwrap();
        let opponent_idx = inner
            .queue
            .iter()
            .position(|e| e.device_id != entry.device_id);

        match opponent_idx {
            Some(idx) => {
                let opponent = inner.queue.remove(idx).expect("index just found");
                QueueJoinResult::Matched { opponent }
            }
            None => {
                inner.queue.push_back(entry);
                QueueJoinResult::Waiting {
                    position: inner.queue.len() as u32,
                }
            }
        }
    }

    fn leave(&self, device_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.retain(|e| e.device_id != device_id);
    }

    fn position(&self, device_id: &str) -> Option<u32> {
        let inner = self.inner.lock().unwrap();
        inner
            .queue
            .iter()
            .position(|e| e.device_id == device_id)
            .map(|idx| idx as u32 + 1)
    }

    fn reinsert(&self, a: QueueEntry, b: QueueEntry) {
        let mut inner = self.inner.lock().unwrap();
        let (first, second) = if a.joined_at <= b.joined_at { (a, b) } else { (b, a) };
        inner.queue.push_front(second);
        inner.queue.push_front(first);
    }

    fn put_mailbox(&self, device_id: &str, entry: MailboxEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .mailboxes
            .insert(device_id.to_string(), (entry, Instant::now()));
    }

    fn peek_mailbox(&self, device_id: &str) -> Option<MailboxEntry> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((entry, stamped_at)) = inner.mailboxes.get(device_id) {
            if stamped_at.elapsed() <= MAILBOX_TTL {
                return Some(entry.clone());
            }
            let expired_key = device_id.to_string();
            inner.mailboxes.remove(&expired_key);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_waits_second_entry_matches() {
        let store = InMemoryQueueStore::new();
        let a = QueueEntry {
            device_id: "a".into(),
            display_name: "A".into(),
            turn_timeout_seconds: 0,
            joined_at: Instant::now(),
        };
        match store.join(a) {
            QueueJoinResult::Waiting { position } => assert_eq!(position, 1),
            _ => panic!("expected Waiting"),
        }

        let b = QueueEntry {
            device_id: "b".into(),
            display_name: "B".into(),
            turn_timeout_seconds: 0,
            joined_at: Instant::now(),
        };
        match store.join(b) {
            QueueJoinResult::Matched { opponent } => assert_eq!(opponent.device_id, "a"),
            _ => panic!("expected Matched"),
        }
        assert!(!store.contains("a"));
        assert!(!store.contains("b"));
    }

    #[test]
    fn reinsert_restores_original_order() {
        let store = InMemoryQueueStore::new();
        let earlier = QueueEntry {
            device_id: "a".into(),
            display_name: "A".into(),
            turn_timeout_seconds: 0,
            joined_at: Instant::now(),
        };
        let later = QueueEntry {
            device_id: "b".into(),
            display_name: "B".into(),
            turn_timeout_seconds: 0,
            joined_at: Instant::now() + Duration::from_secs(1),
        };
        store.reinsert(later.clone(), earlier.clone());
        assert_eq!(store.position("a"), Some(1));
        assert_eq!(store.position("b"), Some(2));
    }

    #[test]
    fn mailbox_is_visible_to_both_peers_until_expiry() {
        let store = InMemoryQueueStore::new();
        let entry = MailboxEntry {
            game_id: "g1".into(),
            opponent_device_id: "b".into(),
            opponent_name: "B".into(),
            assigned_color: Color::Red,
        };
        store.put_mailbox("a", entry.clone());
        assert_eq!(store.peek_mailbox("a"), Some(entry));
        assert_eq!(store.peek_mailbox("unrelated"), None);
    }
}

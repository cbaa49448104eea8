//! Configuration for the Xiangqi server.
//!
//! Handles data directory and listen address configuration with the
//! following precedence:
//! 1. Environment variable
//! 2. XDG-style production default
//! 3. `./data` fallback for development

use std::path::PathBuf;

const DEFAULT_DATA_SUBDIR: &str = ".local/share/xiangqi-server";
const DEV_DATA_DIR: &str = "./data";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TURN_TIMEOUT_SECONDS: u32 = 300;

/// Get the data directory for persistence.
///
/// Priority: `XIANGQI_DATA_DIR` env var, then `$HOME/.local/share/xiangqi-server`,
/// then `./data`.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XIANGQI_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_DATA_SUBDIR);
    }
    PathBuf::from(DEV_DATA_DIR)
}

pub fn get_db_path() -> PathBuf {
    get_data_dir().join("xiangqi.db")
}

pub fn get_bind_addr() -> String {
    std::env::var("XIANGQI_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
}

/// The turn-timeout used when both matchmaking preferences are zero/unset.
pub fn default_turn_timeout_seconds() -> u32 {
    std::env::var("XIANGQI_DEFAULT_TURN_TIMEOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TURN_TIMEOUT_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_never_empty() {
        assert!(!get_data_dir().as_os_str().is_empty());
    }

    #[test]
    fn default_turn_timeout_has_a_sane_fallback() {
        std::env::remove_var("XIANGQI_DEFAULT_TURN_TIMEOUT_SECONDS");
        assert_eq!(default_turn_timeout_seconds(), 300);
    }
}

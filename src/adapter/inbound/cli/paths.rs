//! Path utilities for runall.
//!
//! Configuration lives next to the services it describes (`./runall.toml`).
//! Per-user runtime state lives under `~/.runall/`:
//! - `~/.runall/status.json` - the running supervisor's status file

use std::path::{Path, PathBuf};

use crate::infrastructure::config::settings::Config;

/// Returns the runall home directory (`~/.runall/`).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".runall")
}

/// Returns the default config file path (`./runall.toml`).
pub fn default_config() -> PathBuf {
    PathBuf::from("runall.toml")
}

/// Returns the default status file path (`~/.runall/status.json`).
pub fn default_status_file() -> PathBuf {
    home_dir().join("status.json")
}

/// Pick the status file: explicit flag, then `[supervisor].status_file`,
/// then the default.
pub fn status_file(explicit: Option<&Path>, config: Option<&Config>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| config.and_then(Config::status_file).map(Path::to_path_buf))
        .unwrap_or_else(default_status_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_file_is_under_runall_home() {
        let path = default_status_file();
        assert!(path.to_string_lossy().contains(".runall"));
        assert!(path.ends_with("status.json"));
    }

    #[test]
    fn explicit_status_file_wins() {
        let explicit = PathBuf::from("/tmp/explicit.json");
        assert_eq!(status_file(Some(&explicit), None), explicit);
        assert_eq!(status_file(None, None), default_status_file());
    }
}

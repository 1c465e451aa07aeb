//! Status file for out-of-process observers.
//!
//! The supervising `runall run` process writes a JSON file that separate
//! `status`, `stop` and `broadcast` invocations read to find the
//! supervisor and the services it manages.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::application::StatusSnapshot;
use crate::error::Result;

/// Current status file format version.
const STATUS_VERSION: &str = "1";

/// Top-level status file structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFile {
    /// Schema version for forward compatibility.
    pub version: String,
    /// Supervisor process ID.
    pub pid: u32,
    /// When the supervisor started.
    pub started_at: DateTime<Utc>,
    /// Config file the supervisor was started with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    /// Orchestrator state at `updated_at`.
    pub snapshot: StatusSnapshot,
    /// When this file was last updated.
    pub updated_at: DateTime<Utc>,
}

impl StatusFile {
    /// Read a status file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Writer for the status file.
///
/// Thread-safe wrapper that manages atomic updates to the status file.
pub struct StatusWriter {
    path: PathBuf,
    status: Mutex<StatusFile>,
}

impl StatusWriter {
    /// A writer for `path`. Nothing touches disk until [`write`](Self::write)
    /// or [`update`](Self::update).
    #[must_use]
    pub fn new(path: PathBuf, config_path: Option<PathBuf>) -> Self {
        let now = Utc::now();
        let status = StatusFile {
            version: STATUS_VERSION.to_string(),
            pid: std::process::id(),
            started_at: now,
            config_path,
            snapshot: StatusSnapshot::default(),
            updated_at: now,
        };

        Self {
            path,
            status: Mutex::new(status),
        }
    }

    /// Where the status file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the snapshot and write the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn update(&self, snapshot: StatusSnapshot) -> Result<()> {
        self.status.lock().snapshot = snapshot;
        self.write()
    }

    /// Write the current status to the file atomically.
    ///
    /// Uses write-to-temp-then-rename. Creates the parent directory if it
    /// doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self) -> Result<()> {
        let json = {
            let mut status = self.status.lock();
            status.updated_at = Utc::now();
            serde_json::to_string_pretty(&*status)?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }

    /// Delete the status file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

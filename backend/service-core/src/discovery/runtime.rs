//! Runtime record of a running worker.
//!
//! The daemon writes a small JSON record (pid, port, token) on startup so
//! clients can rediscover it without scanning the process table. The
//! record lives in the user's runtime directory and is removed on clean
//! shutdown; a stale record is detected by checking the recorded pid
//! against the live process table.

use crate::error::discovery::DiscoveryError;
use crate::WORKER_BINARY;

use common::ErrorLocation;

use std::fs;
use std::panic::Location;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const RUNTIME_DIR_NAME: &str = "privlink";
const RUNTIME_FILE_NAME: &str = "privlinkd.json";

/// Identity of a running worker as written by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub pid: u32,
    pub port: u16,
    /// Handshake token clients must present. Plaintext by necessity -
    /// the record is how clients learn it; the file is created 0600.
    pub token: Option<String>,
}

/// Path of the runtime record, if a runtime directory exists.
pub fn record_path() -> Option<PathBuf> {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join(RUNTIME_DIR_NAME).join(RUNTIME_FILE_NAME))
}

/// Write the runtime record using an atomic temp-file rename.
#[track_caller]
pub fn write_record(record: &RuntimeRecord) -> Result<(), DiscoveryError> {
    let path = record_path().ok_or_else(|| DiscoveryError::Record {
        message: String::from("No runtime directory available"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let dir = path.parent().ok_or_else(|| DiscoveryError::Record {
        message: format!("Record path has no parent: {}", path.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    fs::create_dir_all(dir).map_err(|e| DiscoveryError::Record {
        message: format!("Failed to create runtime directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let json = serde_json::to_string_pretty(record).map_err(|e| DiscoveryError::Record {
        message: format!("Failed to serialize runtime record: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let temp_path = dir.join(format!("{RUNTIME_FILE_NAME}.tmp"));
    fs::write(&temp_path, json).map_err(|e| DiscoveryError::Record {
        message: format!("Failed to write runtime record: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    restrict_permissions(&temp_path);

    // Atomic rename (POSIX guarantees atomicity)
    fs::rename(&temp_path, &path).map_err(|e| DiscoveryError::Record {
        message: format!("Failed to move runtime record into place: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    info!("Runtime record written to {}", path.display());
    Ok(())
}

/// Read the runtime record, if one exists and parses.
///
/// Any failure is treated as "no record" - discovery falls back to the
/// process scan.
pub fn read_record() -> Option<RuntimeRecord> {
    let path = record_path()?;
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("No runtime record at {}: {e}", path.display());
            return None;
        }
    };

    match serde_json::from_str::<RuntimeRecord>(&contents) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Ignoring unparseable runtime record: {e}");
            None
        }
    }
}

/// Remove the runtime record. Missing file is not an error.
pub fn remove_record() {
    if let Some(path) = record_path() {
        match fs::remove_file(&path) {
            Ok(()) => info!("Runtime record removed"),
            Err(e) => debug!("Runtime record not removed: {e}"),
        }
    }
}

/// Whether `record` still points at a live worker process.
pub fn record_is_live(record: &RuntimeRecord) -> bool {
    super::process::with_process(record.pid, |process| {
        process.name().to_string_lossy().contains(WORKER_BINARY)
    })
    .unwrap_or(false)
}

// The record carries the handshake token; keep it out of other users' reach.
#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("Failed to restrict runtime record permissions: {e}");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) {}

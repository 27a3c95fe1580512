//! Known-process enumeration for the worker side.
//!
//! The resolver never enumerates processes itself; the host pairs each
//! lookup with a fresh snapshot from one of these enumerators.

use models::{ProcessInfo, ProcessSnapshot};

use sysinfo::{Process, ProcessesToUpdate, System};

use crate::discovery::process::format_command;

/// Source of the "known processes" snapshot a lookup resolves against.
pub trait ProcessEnumerator: Send + Sync {
    fn snapshot(&self) -> ProcessSnapshot;
}

/// Enumerates session-leader processes (session id == pid).
///
/// Session leaders are the closest thing the OS has to "the application
/// a pid belongs to": every process forked under a terminal, editor or
/// desktop app session walks up to one of these.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionEnumerator;

impl ProcessEnumerator for SessionEnumerator {
    fn snapshot(&self) -> ProcessSnapshot {
        let mut sys = System::new_all();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        sys.processes()
            .iter()
            .filter(|(pid, process)| process.session_id().is_some_and(|sid| sid == **pid))
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
                command: format_command(process),
                uid: process_uid(process),
            })
            .collect()
    }
}

#[cfg(unix)]
fn process_uid(process: &Process) -> Option<u32> {
    process.user_id().map(|uid| **uid)
}

#[cfg(not(unix))]
fn process_uid(_process: &Process) -> Option<u32> {
    None
}

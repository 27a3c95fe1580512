//! Process ancestry resolution.
//!
//! Maps an arbitrary pid to the known process that owns it by walking
//! parent links in live OS state: if the pid itself is in the snapshot
//! that entry wins, otherwise the walk moves to the parent pid and tries
//! again. Live state can mutate or vanish mid-walk - a pid that
//! disappears between two reads is treated as "died mid-walk" and yields
//! not-found, never an error.

pub mod enumerate;

use models::{ProcessInfo, ProcessSnapshot};

use std::fs;
use std::io;

use log::{debug, trace};

const PROC_ROOT: &str = "/proc";
const PARENT_PID_KEY: &str = "PPid:";

/// Pids at or below this value are roots; the walk stops there.
const ROOT_PID: u32 = 1;

/// Read access to live parent-pid links.
///
/// Injected so the walk can be exercised against synthetic process trees;
/// the production implementation is [`ProcfsParentLinks`].
pub trait ParentLinks {
    /// Read the parent pid for `pid` from live process state.
    ///
    /// `Ok(None)` means the record exists but carries no usable parent
    /// field; `Err` means the process is gone. The resolver treats both
    /// as the end of the walk.
    fn parent_of(&self, pid: u32) -> io::Result<Option<u32>>;
}

/// Parent links read from `/proc/<pid>/status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsParentLinks;

impl ParentLinks for ProcfsParentLinks {
    fn parent_of(&self, pid: u32) -> io::Result<Option<u32>> {
        let status = fs::read_to_string(format!("{PROC_ROOT}/{pid}/status"))?;
        Ok(parse_parent_pid(&status))
    }
}

/// Extract the `PPid:` value from a status record.
pub(crate) fn parse_parent_pid(status: &str) -> Option<u32> {
    let line = status.lines().find(|line| line.starts_with(PARENT_PID_KEY))?;
    line[PARENT_PID_KEY.len()..].trim().parse().ok()
}

/// Resolve the known process owning `pid`.
///
/// Starting at `pid`, returns the first ancestor (including `pid` itself)
/// present in `known`. The walk terminates at root pids (<= 1) and on any
/// failed parent read, both yielding `None`.
///
/// Each call re-reads live state; nothing is memoized across calls.
pub fn resolve_owner<L>(pid: u32, known: &ProcessSnapshot, links: &L) -> Option<ProcessInfo>
where
    L: ParentLinks + ?Sized,
{
    let mut pid = pid;
    while pid > ROOT_PID {
        if let Some(found) = known.find(pid) {
            trace!("Resolved owner of pid chain: {} ({})", found.pid, found.name);
            return Some(found.clone());
        }

        match links.parent_of(pid) {
            Ok(Some(parent)) => {
                trace!("Pid {pid} not known, walking up to parent {parent}");
                pid = parent;
            }
            Ok(None) => return None,
            Err(e) => {
                // The process died mid-walk
                debug!("Parent read for pid {pid} failed: {e}");
                return None;
            }
        }
    }
    None
}

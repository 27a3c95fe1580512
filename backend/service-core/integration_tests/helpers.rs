// Shared fixtures: an in-process host with synthetic process state.
// The host binds port 0, so tests never collide; the accept loop lives
// until the test process exits, which is fine for test lifetimes.

use common::RedactedToken;
use models::{ProcessInfo, ProcessSnapshot};
use service_core::host::{start_host, HostHandle, HostOptions};
use service_core::resolver::enumerate::ProcessEnumerator;
use service_core::resolver::ParentLinks;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

pub struct FakeEnumerator {
    entries: Vec<ProcessInfo>,
}

impl ProcessEnumerator for FakeEnumerator {
    fn snapshot(&self) -> ProcessSnapshot {
        self.entries.iter().cloned().collect()
    }
}

/// Enumerator whose snapshot dies, for exercising the host's failure
/// containment.
pub struct PanickingEnumerator;

impl ProcessEnumerator for PanickingEnumerator {
    fn snapshot(&self) -> ProcessSnapshot {
        panic!("enumeration failed")
    }
}

pub struct FakeLinks {
    parents: HashMap<u32, u32>,
}

impl ParentLinks for FakeLinks {
    fn parent_of(&self, pid: u32) -> io::Result<Option<u32>> {
        Ok(self.parents.get(&pid).copied())
    }
}

pub fn process_entry(pid: u32, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        command: format!("{name} --session"),
        uid: Some(1000),
    }
}

pub async fn start_test_host(
    entries: Vec<ProcessInfo>,
    parents: &[(u32, u32)],
    token: Option<&str>,
) -> HostHandle {
    start_host(
        0,
        HostOptions {
            token: token.map(|t| RedactedToken::new(t.to_string())),
            enumerator: Arc::new(FakeEnumerator { entries }),
            links: Arc::new(FakeLinks {
                parents: parents.iter().copied().collect(),
            }),
        },
    )
    .await
    .expect("test host must bind")
}

pub async fn start_panicking_host() -> HostHandle {
    start_host(
        0,
        HostOptions {
            token: None,
            enumerator: Arc::new(PanickingEnumerator),
            links: Arc::new(FakeLinks {
                parents: HashMap::new(),
            }),
        },
    )
    .await
    .expect("test host must bind")
}

pub fn base_url(handle: &HostHandle) -> String {
    format!("ws://127.0.0.1:{}", handle.port())
}

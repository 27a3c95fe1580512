//! Worker discovery and spawning utilities.
//!
//! This module provides functionality for:
//! - Discovering a running `privlinkd` worker (runtime record, then
//!   process scan)
//! - Spawning a new worker when none is found
//! - Managing port overrides for development and testing
//!
//! # Port Override
//!
//! By default, discovery scans for a running worker on any port. You can
//! override this behavior to target a specific port using
//! [`set_override_port`].

pub mod process;
pub mod runtime;
pub mod spawn;

use std::sync::Mutex;

static OVERRIDE_PORT: Mutex<Option<u16>> = Mutex::new(None);

/// Set a port override for worker discovery and spawning.
///
/// When set, discovery only looks at this specific port and spawning
/// starts the worker on it instead of auto-selecting.
///
/// # Arguments
///
/// * `port` - The port number to use for worker discovery and spawning
pub fn set_override_port(port: u16) {
    if let Ok(mut p) = OVERRIDE_PORT.lock() {
        *p = Some(port);
    }
}

/// Get the current port override, if set.
///
/// # Returns
///
/// * `Some(port)` - If a port override is configured
/// * `None` - If no override is set
pub fn get_override_port() -> Option<u16> {
    OVERRIDE_PORT.lock().ok().and_then(|p| *p)
}

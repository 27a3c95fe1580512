//! Elevation probe.
//!
//! Binding to the privileged worker is only attempted when this process
//! actually holds elevated access; without it the bind would never be
//! accepted and callers would wait on a gate that cannot open. Callers
//! that depend on the worker must consult this check first.

/// Whether this process has elevated (root) access.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Whether this process has elevated access.
///
/// Always `false` off unix; the worker protocol is unix-only.
#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

//! Host handle type.

use std::net::SocketAddr;

/// Handle to a running privileged host.
///
/// Returned by [`start_host`](crate::host::start_host); carries the bound
/// address so a port-0 auto-select can be announced to clients.
///
/// # Lifecycle
///
/// Dropping this handle does **not** stop the host. The accept loop runs
/// until the process exits, matching the worker's lifetime.
pub struct HostHandle {
    local_addr: SocketAddr,
}

impl HostHandle {
    pub(crate) fn new(local_addr: SocketAddr) -> Self {
        Self { local_addr }
    }

    /// Address the host actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the host actually bound (resolved when 0 was requested).
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

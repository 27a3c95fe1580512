//! Worker connection lifecycle.
//!
//! [`ServiceConnector`] owns exactly one [`RemoteHandle`] slot and the
//! [`ConnectionGate`]; it mediates bind attempts and is driven by the
//! connect/disconnect callbacks its [`WorkerBinding`] delivers. There is
//! one connector per process, constructed at startup and torn down on
//! exit, preserving the "exactly one logical connection" invariant
//! without global state.
//!
//! # Concurrency
//!
//! Any number of threads may call the accessors and `ensure_bound`
//! concurrently; the binding delivers callbacks from its own task. The
//! callbacks are the only writers of the handle slot and the state
//! (single-writer discipline); readers synchronize through the gate
//! alone. The gate is signalled only after the handle is stored, so a
//! released waiter always observes a usable handle - unless a disconnect
//! races in between, in which case the accessor returns `None` and the
//! caller retries.
//!
//! # The no-block rule
//!
//! Blocking accessors must never run on a tokio runtime thread: the
//! runtime is also what delivers the connect callback that would open
//! the gate, so blocking there can deadlock the whole process. The
//! connector detects that context and degrades to a non-blocking
//! snapshot instead of blocking.

pub mod binding;

use crate::gate::ConnectionGate;
use crate::remote::{FsAccess, RemoteFs, RemoteHandle};

use self::binding::WorkerBinding;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::RwLock;

/// Connection lifecycle states.
///
/// `Unbound -> Binding` on the first bind request, `Binding ->
/// Connected` on a successful connect, `Connected -> Binding` on every
/// disconnect. Never returns to `Unbound`: once requested, the logical
/// connection lives as long as the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Unbound = 0,
    Binding = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Unbound,
            1 => ConnectionState::Binding,
            _ => ConnectionState::Connected,
        }
    }
}

/// Receiver of connect/disconnect events from a [`WorkerBinding`].
pub trait ConnectionObserver: Send + Sync {
    /// The worker became reachable. `fs` is the filesystem capability
    /// derived over the new connection.
    fn on_connected(&self, handle: RemoteHandle, fs: RemoteFs);

    /// The worker became unreachable (crash, kill, revoked privilege).
    fn on_disconnected(&self);
}

/// Owner of the bind/rebind lifecycle and the published remote handle.
pub struct ServiceConnector {
    binding: Arc<dyn WorkerBinding>,
    gate: ConnectionGate,
    state: AtomicU8,
    remote: RwLock<Option<RemoteHandle>>,
    fs: RwLock<FsAccess>,
    privileged: bool,
    self_ref: Weak<ServiceConnector>,
}

impl ServiceConnector {
    /// Create a connector, probing elevation from the environment.
    pub fn new(binding: Arc<dyn WorkerBinding>) -> Arc<Self> {
        Self::with_privilege(binding, common::privilege::is_elevated())
    }

    /// Create a connector with an explicit elevation verdict.
    ///
    /// Without elevation, `ensure_bound` is a permanent no-op and the
    /// accessors return `None` without blocking - the worker can never
    /// be reached, so there is nothing to wait for.
    pub fn with_privilege(binding: Arc<dyn WorkerBinding>, privileged: bool) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            binding,
            gate: ConnectionGate::new(),
            state: AtomicU8::new(ConnectionState::Unbound as u8),
            remote: RwLock::new(None),
            fs: RwLock::new(FsAccess::Local),
            privileged,
            self_ref: self_ref.clone(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Request a bind if none is in flight.
    ///
    /// Idempotent under concurrency: however many callers race here,
    /// exactly one physical bind request is issued per disconnect cycle.
    pub fn ensure_bound(&self) {
        if !self.privileged {
            debug!("Elevated access unavailable, not binding");
            return;
        }

        if self
            .state
            .compare_exchange(
                ConnectionState::Unbound as u8,
                ConnectionState::Binding as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            info!("Binding privileged worker");
            self.bind_through(self.binding.as_ref());
        }
    }

    /// Blocking accessor for the remote handle.
    ///
    /// Ensures a bind is in flight, waits on the gate, then returns the
    /// current handle. On a runtime thread the wait is skipped and the
    /// current snapshot is returned instead, which may be `None`. A
    /// `None` or stale handle also occurs when a disconnect races the
    /// wakeup - callers retry rather than treating it as fatal.
    pub fn remote(&self) -> Option<RemoteHandle> {
        self.ensure_bound();
        self.await_ready(None);
        self.remote.read().clone()
    }

    /// Like [`remote`](Self::remote) but gives up after `timeout`.
    pub fn remote_timeout(&self, timeout: Duration) -> Option<RemoteHandle> {
        self.ensure_bound();
        self.await_ready(Some(timeout));
        self.remote.read().clone()
    }

    /// Non-blocking snapshot of the remote handle.
    pub fn try_remote(&self) -> Option<RemoteHandle> {
        self.remote.read().clone()
    }

    /// Current filesystem access: local until a worker is connected.
    pub fn filesystem(&self) -> FsAccess {
        self.fs.read().clone()
    }

    fn await_ready(&self, timeout: Option<Duration>) {
        if !self.privileged {
            return;
        }

        if tokio::runtime::Handle::try_current().is_ok() {
            // This thread must stay free to run the connect callback.
            if !self.gate.try_wait() {
                warn!(
                    "Blocking accessor called on a runtime thread before the worker is ready, \
                     returning degraded result"
                );
            }
            return;
        }

        match timeout {
            Some(timeout) => {
                self.gate.wait_timeout(timeout);
            }
            None => self.gate.wait(),
        }
    }

    fn bind_through(&self, binding: &dyn WorkerBinding) {
        match self.self_ref.upgrade() {
            Some(connector) => binding.bind(connector),
            // Only reachable while the connector is being dropped.
            None => debug!("Connector going away, skipping bind"),
        }
    }
}

impl ConnectionObserver for ServiceConnector {
    fn on_connected(&self, handle: RemoteHandle, fs: RemoteFs) {
        debug!("Worker connected (pid {})", handle.worker_pid());
        *self.remote.write() = Some(handle);
        *self.fs.write() = FsAccess::Remote(fs);
        self.state
            .store(ConnectionState::Connected as u8, Ordering::Release);
        // Handle is fully stored; release the waiters.
        self.gate.signal();
    }

    fn on_disconnected(&self) {
        warn!("Worker disconnected, rebinding");
        self.state
            .store(ConnectionState::Binding as u8, Ordering::Release);
        *self.remote.write() = None;
        *self.fs.write() = FsAccess::Local;
        self.gate.reset();
        // Reset strictly precedes the re-bind of the same logical worker.
        self.bind_through(self.binding.as_ref());
    }
}

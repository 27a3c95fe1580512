//! Worker binding implementations.
//!
//! A [`WorkerBinding`] is the component-activation seam: "start the
//! worker, deliver connect/disconnect to the observer". It is injected
//! into the connector so the gate and lifecycle logic can be tested
//! without a real privileged worker.

use crate::connector::ConnectionObserver;
use crate::discovery::{process, runtime, spawn};
use crate::error::CoreError;
use crate::error::discovery::DiscoveryError;
use crate::remote::{self, RemoteFs, RemoteHandle};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use log::{debug, info, warn};
use tokio::time::sleep as TokioSleep;
use zeroize::Zeroizing;

/// Issues one bind cycle per call: keep trying to reach the worker until
/// connected, monitor the connection, report the disconnect, and end.
/// The observer's disconnect handling issues the next cycle.
pub trait WorkerBinding: Send + Sync {
    /// Begin a bind cycle. Must not block; the work runs on the
    /// binding's own tasks.
    fn bind(&self, observer: Arc<dyn ConnectionObserver>);
}

/// Pacing of the bind cycle issued after a disconnect.
///
/// The observed behavior of the system this replaces is an immediate
/// synchronous re-bind from the disconnect callback; whether a delay was
/// intended is unknowable from outside, so the choice is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindPolicy {
    /// Start reconnecting as soon as the disconnect is observed.
    Immediate,
    /// Sleep `initial` before the first reconnect attempt of the cycle.
    Backoff { initial: Duration },
}

impl Default for RebindPolicy {
    fn default() -> Self {
        RebindPolicy::Immediate
    }
}

/// Configuration for [`SpawnBinding`].
#[derive(Debug, Clone)]
pub struct BindOptions {
    /// Spawn a worker when discovery finds none.
    pub auto_spawn: bool,
    /// Alternative worker binary name or path.
    pub binary_override: Option<String>,
    pub rebind: RebindPolicy,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            auto_spawn: true,
            binary_override: None,
            rebind: RebindPolicy::default(),
        }
    }
}

/// Production binding: discover or spawn `privlinkd`, connect over
/// WebSocket, and monitor the connection until it drops.
pub struct SpawnBinding {
    runtime: tokio::runtime::Handle,
    options: BindOptions,
    cycles: AtomicU32,
}

impl SpawnBinding {
    /// # Arguments
    ///
    /// * `runtime` - Handle of the runtime the bind cycles run on; the
    ///   same runtime later delivers the observer callbacks
    pub fn new(runtime: tokio::runtime::Handle, options: BindOptions) -> Self {
        Self {
            runtime,
            options,
            cycles: AtomicU32::new(0),
        }
    }
}

impl WorkerBinding for SpawnBinding {
    fn bind(&self, observer: Arc<dyn ConnectionObserver>) {
        let options = self.options.clone();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed);
        self.runtime.spawn(run_bind_cycle(options, cycle, observer));
    }
}

/// One full bind cycle: connect (retrying), publish, monitor, report.
async fn run_bind_cycle(options: BindOptions, cycle: u32, observer: Arc<dyn ConnectionObserver>) {
    // Cycle 0 is the initial bind; later cycles are disconnect rebinds
    // and honor the rebind policy.
    if cycle > 0
        && let RebindPolicy::Backoff { initial } = options.rebind
    {
        debug!("Delaying rebind by {initial:?}");
        TokioSleep(initial).await;
    }

    let mut backoff = ExponentialBackoff {
        // The worker must eventually come back; keep trying.
        max_elapsed_time: None,
        ..Default::default()
    };

    let (handle, fs) = loop {
        match connect_once(&options).await {
            Ok(connected) => break connected,
            Err(e) => {
                warn!("Worker connect attempt failed: {e}");
                // next_backoff is always Some without max_elapsed_time
                if let Some(delay) = backoff.next_backoff() {
                    TokioSleep(delay).await;
                }
            }
        }
    };

    info!("Bind cycle {cycle} connected to worker pid {}", handle.worker_pid());
    observer.on_connected(handle.clone(), fs);

    handle.closed().await;
    observer.on_disconnected();
}

/// Find or start the worker and establish one connection to it.
async fn connect_once(options: &BindOptions) -> Result<(RemoteHandle, RemoteFs), CoreError> {
    let worker = match process::discover()? {
        Some(worker) => worker,
        None if options.auto_spawn => {
            debug!("No running worker, spawning one");
            spawn::spawn_and_wait(options.binary_override.as_deref()).await?
        }
        None => {
            return Err(DiscoveryError::Validation {
                message: String::from("No worker available and auto-spawn is disabled"),
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }
    };

    // The daemon records its token on startup; match it by pid.
    let token = runtime::read_record()
        .filter(|record| record.pid == worker.pid)
        .and_then(|record| record.token)
        .map(Zeroizing::new);

    let handle = remote::connect(&worker.base_url, token.as_ref().map(|t| t.as_str())).await?;
    let fs = RemoteFs::acquire(&handle).await?;

    Ok((handle, fs))
}

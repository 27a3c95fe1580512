use crate::discovery::{get_override_port, runtime};
use crate::error::discovery::DiscoveryError;
use crate::remote::client_hello;
use crate::{WORKER_BASE_URL, WORKER_BINARY};

use common::ErrorLocation;
use models::{WorkerInfo, WorkerInfoBuilder};

use std::panic::Location;
use std::thread::sleep;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use log::{debug, trace};
use netstat2::{
    get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, SocketInfo, TcpState,
};
use sysinfo::{Pid, Process, ProcessesToUpdate, Signal, System};
use tokio_tungstenite::connect_async;

const CHECK_HEALTH_DURATION: Duration = Duration::from_secs(3);
const KILL_VERIFY_MAX_ELAPSED: Duration = Duration::from_secs(5);

#[track_caller]
fn query_tcp_sockets() -> Result<Vec<SocketInfo>, DiscoveryError> {
    get_sockets_info(
        AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
        ProtocolFlags::TCP,
    )
    .map_err(|e| DiscoveryError::NetworkQuery {
        message: format!("Failed to query network sockets: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })
}

#[track_caller]
fn discover_on_port(port: u16) -> Result<Option<WorkerInfo>, DiscoveryError> {
    let sockets = query_tcp_sockets()?;

    for s in sockets {
        if let ProtocolSocketInfo::Tcp(tcp) = s.protocol_socket_info
            && tcp.state == TcpState::Listen
            && tcp.local_port == port
            && let Some(&pid) = s.associated_pids.first()
        {
            trace!("Found process {pid} listening on port {port}");

            let data = with_process(pid, |p| {
                (p.name().to_string_lossy().to_string(), format_command(p))
            });

            if let Some((name, command)) = data {
                debug!("Discovered worker: {name} (PID: {pid})");
                return Ok(Some(build_worker_info(pid, port, &command)?));
            }

            trace!("Process {pid} disappeared before we could read its info");
        }
    }

    debug!("No process found listening on port {port}");
    Ok(None)
}

#[track_caller]
fn discover_from_record() -> Result<Option<WorkerInfo>, DiscoveryError> {
    let Some(record) = runtime::read_record() else {
        return Ok(None);
    };

    if !runtime::record_is_live(&record) {
        debug!(
            "Runtime record points at dead or replaced pid {}, ignoring",
            record.pid
        );
        return Ok(None);
    }

    let command = with_process(record.pid, format_command).unwrap_or_default();

    debug!(
        "Discovered worker from runtime record: PID={}, port={}",
        record.pid, record.port
    );

    Ok(Some(build_worker_info(record.pid, record.port, &command)?))
}

#[track_caller]
fn find_listening_port(pid: u32) -> Result<Option<u16>, DiscoveryError> {
    let sockets = query_tcp_sockets()?;

    for s in sockets {
        if let ProtocolSocketInfo::Tcp(tcp) = s.protocol_socket_info
            && tcp.state == TcpState::Listen
            && s.associated_pids.contains(&pid)
        {
            return Ok(Some(tcp.local_port));
        }
    }

    Ok(None)
}

#[track_caller]
fn discover_by_process_scan() -> Result<Option<WorkerInfo>, DiscoveryError> {
    let mut sys = System::new_all();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    trace!("Scanning {} processes", sys.processes().len());

    for (pid, p) in sys.processes() {
        let name = p.name().to_string_lossy().to_string();

        if !name.contains(WORKER_BINARY) {
            continue;
        }

        trace!("Found candidate process: {name} (PID: {pid})");

        let pid_u32 = pid.as_u32();
        if let Some(port) = find_listening_port(pid_u32)? {
            debug!("Discovered worker: {name} on port {port} (PID: {pid_u32})");
            return Ok(Some(build_worker_info(pid_u32, port, &format_command(p))?));
        }
    }

    debug!("No worker found");
    Ok(None)
}

#[track_caller]
fn build_worker_info(pid: u32, port: u16, command: &str) -> Result<WorkerInfo, DiscoveryError> {
    let command = if command.is_empty() {
        WORKER_BINARY.to_string()
    } else {
        command.to_string()
    };

    WorkerInfoBuilder::default()
        .with_pid(pid)
        .with_port(port)
        .with_base_url(format!("{WORKER_BASE_URL}:{port}"))
        .with_name(WORKER_BINARY)
        .with_command(command)
        .with_owned(false)
        .build()
        .map_err(|e| DiscoveryError::Validation {
            message: format!("Discovered worker failed validation: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

#[track_caller]
pub(crate) fn with_process<F, R>(pid: u32, f: F) -> Option<R>
where
    F: FnOnce(&Process) -> R,
{
    let mut sys = System::new_all();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    sys.process(Pid::from_u32(pid)).map(f)
}

pub(crate) fn format_command(process: &Process) -> String {
    let cmd_vec: Vec<String> = process
        .cmd()
        .iter()
        .map(|s| s.to_string_lossy().to_string())
        .collect();

    if cmd_vec.is_empty() {
        String::new()
    } else {
        cmd_vec.join(" ")
    }
}

/// Discover a running worker process.
///
/// Attempts to find a `privlinkd` worker by:
/// 1. Checking for a port override (if set, looks only at that port)
/// 2. Reading the runtime record the daemon wrote on startup, validated
///    against the live process table
/// 3. Scanning all processes for `privlinkd` and mapping the process to
///    its listening port via netstat
///
/// Note: only workers on localhost (127.0.0.1) are discovered. This is
/// intentional - the privileged worker is never exposed on the network.
///
/// # Returns
///
/// * `Ok(Some(WorkerInfo))` - If a worker is found
/// * `Ok(None)` - If no worker is running
/// * `Err(DiscoveryError)` - If process/network queries fail
#[track_caller]
pub fn discover() -> Result<Option<WorkerInfo>, DiscoveryError> {
    debug!("Starting worker discovery");

    if let Some(override_port) = get_override_port() {
        debug!("Port override set to {override_port}");
        return discover_on_port(override_port);
    }

    if let Some(worker) = discover_from_record()? {
        return Ok(Some(worker));
    }

    debug!("No usable runtime record - scanning for worker processes");
    discover_by_process_scan()
}

/// Stop a worker process by PID.
///
/// Attempts graceful termination (SIGTERM) first, falls back to force
/// kill (SIGKILL). Uses exponential backoff to verify the process has
/// terminated, waiting up to 5 seconds. Refuses root pids outright.
///
/// # Arguments
///
/// * `pid` - Process ID to terminate
///
/// # Returns
///
/// * `true` - If the process was successfully terminated
/// * `false` - If the process doesn't exist or couldn't be killed
pub fn stop_pid(pid: u32) -> bool {
    if pid <= 1 {
        debug!("Refusing to stop root pid {pid}");
        return false;
    }

    let killed = with_process(pid, |p| {
        if let Some(sent) = p.kill_with(Signal::Term) {
            debug!("Sent SIGTERM to PID {pid}: success={sent}");
            sent
        } else {
            let killed = p.kill();
            debug!("Sent SIGKILL to PID {pid}: success={killed}");
            killed
        }
    })
    .unwrap_or_else(|| {
        debug!("Process {pid} not found");
        false
    });

    if !killed {
        return false;
    }

    // Wait with exponential backoff to verify termination
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(KILL_VERIFY_MAX_ELAPSED),
        ..Default::default()
    };

    loop {
        if with_process(pid, |_| true).is_none() {
            debug!("Process {pid} successfully terminated");
            return true;
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Process {pid} still alive, retrying after {duration:?}");
                sleep(duration);
            }
            None => {
                debug!("Process {pid} still running after max backoff time");
                return false;
            }
        }
    }
}

/// Check if the worker is reachable and accepting connections.
///
/// Performs a WebSocket hello round-trip with a 3-second budget.
///
/// # Arguments
///
/// * `base_url` - Endpoint of the worker (e.g., "ws://127.0.0.1:4096")
/// * `token` - Handshake token the worker expects, if any
///
/// # Returns
///
/// * `true` - If the worker accepted the hello
/// * `false` - If the connect or handshake fails or times out
pub async fn check_health(base_url: &str, token: Option<&str>) -> bool {
    let probe = async {
        let (mut stream, _) = match connect_async(base_url).await {
            Ok(connected) => connected,
            Err(e) => {
                debug!("Health check failed for {base_url}: {e}");
                return false;
            }
        };

        match client_hello(&mut stream, token).await {
            Ok(hello) => {
                debug!(
                    "Health check succeeded for {base_url} (worker pid {})",
                    hello.worker_pid
                );
                true
            }
            Err(e) => {
                debug!("Health check failed for {base_url}: {e}");
                false
            }
        }
    };

    match tokio::time::timeout(CHECK_HEALTH_DURATION, probe).await {
        Ok(healthy) => healthy,
        Err(_) => {
            debug!("Health check timed out for {base_url}");
            false
        }
    }
}

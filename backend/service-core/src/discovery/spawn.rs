use crate::discovery::{get_override_port, process::check_health};
use crate::error::spawn::SpawnError;
use crate::{WORKER_BASE_URL, WORKER_BINARY, WORKER_HOSTNAME};

use common::ErrorLocation;
use models::{WorkerInfo, WorkerInfoBuilder};

use std::env::current_exe;
use std::io::Error as IoError;
use std::io::ErrorKind;
use std::mem::forget;
use std::panic::Location;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use log::{debug, info, trace, warn};
use regex::Regex;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;
use tokio::time::sleep as TokioSleep;
use uuid::Uuid;

const PORT_FLAG: &str = "--port";
const AUTO_SELECT_PORT: &str = "0";
const SPAWN_MAX_OUTPUT_LINES: usize = 100;
const HEALTH_CHECK_MAX_ELAPSED: Duration = Duration::from_secs(20);
const WORKER_URL_PATTERN: &str = r"ws://(?P<host>[^\s:]+):(?P<port>\d+)";
const URL_CAPTURE_HOST: &str = "host";
const URL_CAPTURE_PORT: &str = "port";

/// Environment variable carrying the handshake token to a spawned worker.
pub const TOKEN_ENV: &str = "PRIVLINK_TOKEN";

static URL_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| Regex::new(WORKER_URL_PATTERN).expect("valid regex pattern"))
}

pub(crate) fn build_spawn_command(binary: &str, port: &str, token: &str) -> TokioCommand {
    let mut cmd = TokioCommand::new(binary);
    cmd.arg(PORT_FLAG)
        .arg(port)
        .env(TOKEN_ENV, token)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Spawn a worker process and wait for it to become reachable.
///
/// Spawns `privlinkd` (or `binary_override`) with the configured port
/// (auto-select when no port override is set) and a fresh handshake
/// token, parses the worker's stdout for the announced endpoint, then
/// polls the hello handshake until it is accepted.
///
/// The worker is detached on success; the daemon records its own
/// identity in the runtime record, which is where clients pick up the
/// token for later connects.
///
/// # Returns
///
/// * `Ok(WorkerInfo)` - Worker spawned and reachable
/// * `Err(SpawnError)` - Failed to spawn, parse output, or the worker
///   never became reachable
pub async fn spawn_and_wait(binary_override: Option<&str>) -> Result<WorkerInfo, SpawnError> {
    let binary = binary_override.unwrap_or(WORKER_BINARY);
    let port_arg = get_override_port()
        .map(|p| p.to_string())
        .unwrap_or_else(|| AUTO_SELECT_PORT.to_string());
    let token = Uuid::new_v4().to_string();

    info!("Spawning worker {binary} on port {port_arg}");

    let child = spawn_worker_process(binary, &port_arg, &token).await?;
    let (mut child, base_url, port) = parse_worker_url(child).await?;

    if let Err(e) = wait_for_health(&base_url, &token).await {
        warn!(
            "Worker never became reachable, killing spawned process (PID: {:?})",
            child.id()
        );
        let _ = child.kill().await;
        return Err(e);
    }

    let pid = child.id().unwrap_or_default();

    info!("Worker ready at {base_url} (PID: {pid})");

    // Detach the worker - it outlives this client and serves others too.
    // The OS will clean it up when it exits
    forget(child);

    let worker_info = WorkerInfoBuilder::default()
        .with_pid(pid)
        .with_port(port)
        .with_base_url(base_url)
        .with_name(WORKER_BINARY)
        .with_command(format!("{binary} {PORT_FLAG} {port_arg}"))
        .with_owned(true)
        .build()
        .map_err(|e| SpawnError::Validation {
            message: format!("Spawned worker failed validation: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(worker_info)
}

async fn spawn_worker_process(
    binary: &str,
    port: &str,
    token: &str,
) -> Result<TokioChild, SpawnError> {
    debug!("Attempting to spawn {binary} from PATH");

    match build_spawn_command(binary, port, token).spawn() {
        Ok(child) => {
            info!("Spawned {binary} from PATH (PID: {:?})", child.id());
            Ok(child)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{binary} not in PATH, trying local binary");
            spawn_local_binary(binary, port, token)
        }
        Err(err) => Err(SpawnError::Spawn {
            message: format!("Failed to spawn {binary}: {err}"),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(err),
        }),
    }
}

fn spawn_local_binary(binary: &str, port: &str, token: &str) -> Result<TokioChild, SpawnError> {
    let exe = current_exe().map_err(|e| SpawnError::Spawn {
        message: format!("Failed to get current executable path: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })?;

    let dir = exe.parent().ok_or_else(|| SpawnError::Spawn {
        message: format!("Executable has no parent directory: {}", exe.display()),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(IoError::new(ErrorKind::NotFound, "no parent dir")),
    })?;

    let local_path = dir.join(binary);
    debug!("Attempting to spawn from {}", local_path.display());

    build_spawn_command(binary, port, token)
        .current_dir(dir)
        .spawn()
        .map_err(|e| SpawnError::Spawn {
            message: format!("Failed to spawn {binary} from {}: {e}", local_path.display()),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })
}

async fn parse_worker_url(mut child: TokioChild) -> Result<(TokioChild, String, u16), SpawnError> {
    let stdout = child.stdout.take().ok_or_else(|| SpawnError::Parse {
        message: "Worker process has no stdout".to_string(),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let stderr = child.stderr.take();

    // Capture stderr for debugging
    if let Some(stderr) = stderr {
        TokioSpawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("Worker stderr: {line}");
            }
        });
    }

    let mut lines = BufReader::new(stdout).lines();
    let re = get_url_regex();

    for _ in 0..SPAWN_MAX_OUTPUT_LINES {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("Worker output: {line}");

                if let Some(cap) = re.captures(&line) {
                    let host = cap
                        .name(URL_CAPTURE_HOST)
                        .ok_or_else(|| SpawnError::Parse {
                            message: format!(
                                "Regex matched but missing '{URL_CAPTURE_HOST}' capture group"
                            ),
                            location: ErrorLocation::from(Location::caller()),
                        })?
                        .as_str();

                    let port_str = cap
                        .name(URL_CAPTURE_PORT)
                        .ok_or_else(|| SpawnError::Parse {
                            message: format!(
                                "Regex matched but missing '{URL_CAPTURE_PORT}' capture group"
                            ),
                            location: ErrorLocation::from(Location::caller()),
                        })?
                        .as_str();

                    match port_str.parse::<u16>() {
                        Ok(port) => {
                            if host != WORKER_HOSTNAME {
                                warn!(
                                    "Worker announced unexpected hostname: {host}, expected {WORKER_HOSTNAME}"
                                );
                            }

                            let base_url = format!("{WORKER_BASE_URL}:{port}");
                            info!("Parsed worker URL: {base_url}");
                            return Ok((child, base_url, port));
                        }
                        Err(e) => {
                            warn!("Failed to parse port '{port_str}': {e}");
                        }
                    }
                }
            }
            Ok(None) => {
                debug!("Worker process ended before announcing its URL");
                break;
            }
            Err(e) => {
                return Err(SpawnError::Parse {
                    message: format!("Failed to read worker output: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }

    Err(SpawnError::Parse {
        message: format!("No worker URL found in first {SPAWN_MAX_OUTPUT_LINES} lines of output"),
        location: ErrorLocation::from(Location::caller()),
    })
}

async fn wait_for_health(base_url: &str, token: &str) -> Result<(), SpawnError> {
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(HEALTH_CHECK_MAX_ELAPSED),
        ..Default::default()
    };

    debug!("Waiting for worker at {base_url}");

    loop {
        if check_health(base_url, Some(token)).await {
            info!("Worker is reachable at {base_url}");
            return Ok(());
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Worker not ready, retrying after {duration:?}");
                TokioSleep(duration).await;
            }
            None => {
                return Err(SpawnError::Timeout {
                    message: format!(
                        "Worker at {base_url} did not become reachable within {HEALTH_CHECK_MAX_ELAPSED:?}"
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
}

use privlinkd::args::parse_port_arg;
use privlinkd::error::DaemonError;
use privlinkd::logger::initialize as LoggerInitialize;

use service_core::discovery::runtime::{remove_record, write_record, RuntimeRecord};
use service_core::discovery::spawn::TOKEN_ENV;
use service_core::host::{start_host, HostOptions};
use service_core::WORKER_BASE_URL;

use common::{privilege, ErrorLocation, RedactedToken};

use std::env;
use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;

use log::{info, warn};
use uuid::Uuid;

const PORT_ENV: &str = "PRIVLINK_PORT";
const LOG_DIR_NAME: &str = "privlink";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The logger may not be up yet; make the failure visible either way.
        eprintln!("privlinkd failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DaemonError> {
    dotenvy::dotenv().ok();

    let log_dir = log_directory();
    create_dir_all(&log_dir).map_err(|e| DaemonError::Daemon {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    LoggerInitialize(&log_dir)?;

    info!("privlinkd starting");
    info!("Log directory: {}", log_dir.display());

    if !privilege::is_elevated() {
        warn!("Running without elevated privileges; ownership lookups may be incomplete");
    }

    let port = resolve_port();
    let token = env::var(TOKEN_ENV)
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let host = start_host(
        port,
        HostOptions {
            token: Some(RedactedToken::new(token.clone())),
            ..HostOptions::default()
        },
    )
    .await
    .map_err(|e| DaemonError::Host {
        message: format!("Failed to start request host: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Spawning clients parse this line for the endpoint.
    println!("privlinkd listening on {WORKER_BASE_URL}:{}", host.port());

    let record = RuntimeRecord {
        pid: std::process::id(),
        port: host.port(),
        token: Some(token),
    };
    if let Err(e) = write_record(&record) {
        warn!("Runtime record not written, discovery will fall back to scanning: {e}");
    }

    info!("Worker ready on port {}", host.port());

    tokio::signal::ctrl_c().await.map_err(|e| DaemonError::Daemon {
        message: format!("Failed to wait for shutdown signal: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    info!("Shutting down");
    remove_record();
    Ok(())
}

fn resolve_port() -> u16 {
    let args: Vec<String> = env::args().collect();
    parse_port_arg(&args)
        .or_else(|| env::var(PORT_ENV).ok().and_then(|p| p.parse().ok()))
        .unwrap_or(0)
}

fn log_directory() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(env::temp_dir)
        .join(LOG_DIR_NAME)
        .join("logs")
}

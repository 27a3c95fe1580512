use common::ErrorLocation;

use thiserror::Error;

/// Errors that can occur while bringing up or running the daemon.
///
/// Failures after startup are logged and degraded instead; these errors
/// are the ones that abort the process with a non-zero exit.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Error in daemon wiring (directories, logger, signals)
    #[error("Daemon Error: {message} {location}")]
    Daemon {
        message: String,
        location: ErrorLocation,
    },

    /// The request host could not be started
    #[error("Host Error: {message} {location}")]
    Host {
        message: String,
        location: ErrorLocation,
    },
}

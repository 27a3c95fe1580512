pub mod config;
pub mod discovery;
pub mod host;
pub mod remote;
pub mod spawn;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Discovery(#[from] discovery::DiscoveryError),

    #[error(transparent)]
    Spawn(#[from] spawn::SpawnError),

    #[error(transparent)]
    Remote(#[from] remote::RemoteError),

    #[error(transparent)]
    Host(#[from] host::HostError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

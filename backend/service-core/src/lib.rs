pub mod config;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod gate;
pub mod host;
pub mod remote;
pub mod resolver;

#[cfg(test)]
mod tests;

pub const WORKER_BINARY: &str = "privlinkd";
pub const WORKER_HOSTNAME: &str = "127.0.0.1";
pub const WORKER_BASE_URL: &str = const_format::concatcp!("ws://", WORKER_HOSTNAME);

//! Identity of a running privileged worker.

pub mod builder;

pub use builder::WorkerInfoBuilder;

/// A discovered or spawned worker process endpoint.
///
/// Replaced wholesale on every reconnect; holders must re-fetch after a
/// disconnect instead of caching across one.
#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct WorkerInfo {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub port: u32,
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:4096`.
    #[prost(string, tag = "3")]
    pub base_url: String,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(string, tag = "5")]
    pub command: String,
    /// Whether this side manages the worker's lifecycle (spawned it).
    #[prost(bool, tag = "6")]
    pub owned: bool,
}

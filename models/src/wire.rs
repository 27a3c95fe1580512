//! Wire protocol for the worker connection.
//!
//! Binary protobuf frames exchanged over the loopback WebSocket between a
//! client and the privileged worker. The protocol is a handful of fixed
//! messages, so they are written by hand with prost derives instead of
//! being generated from `.proto` sources.
//!
//! # Protocol
//!
//! 1. **First frame MUST be** [`HelloRequest`] carrying the protocol
//!    version and, when the worker requires one, the handshake token
//! 2. The worker answers with [`HelloResponse`] (accepted or not)
//! 3. Subsequent frames are request/response pairs correlated by
//!    `request_id`

/// Version negotiated in the hello handshake. Bump on breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request id used by the hello exchange before correlation starts.
pub const HELLO_REQUEST_ID: u64 = 1;

/// Client -> worker frame.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ClientFrame {
    /// Correlation id echoed back in the matching [`ServerFrame`].
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(oneof = "client_frame::Payload", tags = "2, 3, 4")]
    pub payload: Option<client_frame::Payload>,
}

pub mod client_frame {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        Hello(super::HelloRequest),
        #[prost(message, tag = "3")]
        ResolveOwner(super::ResolveOwnerRequest),
        #[prost(message, tag = "4")]
        FsCapability(super::FsCapabilityRequest),
    }
}

/// Worker -> client frame.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ServerFrame {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(oneof = "server_frame::Payload", tags = "2, 3, 4, 5")]
    pub payload: Option<server_frame::Payload>,
}

pub mod server_frame {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        Hello(super::HelloResponse),
        #[prost(message, tag = "3")]
        ResolveOwner(super::ResolveOwnerResponse),
        #[prost(message, tag = "4")]
        FsCapability(super::FsCapabilityResponse),
        #[prost(message, tag = "5")]
        Error(super::ErrorResponse),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    #[prost(uint32, tag = "1")]
    pub protocol_version: u32,
    /// Required when the worker was started with a handshake token.
    #[prost(string, optional, tag = "2")]
    pub token: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloResponse {
    #[prost(bool, tag = "1")]
    pub accepted: bool,
    #[prost(uint32, tag = "2")]
    pub worker_pid: u32,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResolveOwnerRequest {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResolveOwnerResponse {
    /// Owning known process, absent when the walk found nothing.
    #[prost(message, optional, tag = "1")]
    pub process: Option<ProcessInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FsCapabilityRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FsCapabilityResponse {
    /// Opaque capability id, valid for the lifetime of this connection.
    #[prost(uint64, tag = "1")]
    pub capability: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    Unknown = 0,
    InvalidFrame = 1,
    Rejected = 2,
    NotImplemented = 3,
    Internal = 4,
}

/// A single process entry as carried over the wire and inside snapshots.
#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct ProcessInfo {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub command: String,
    /// Owning user id; absent when the platform does not expose one.
    #[prost(uint32, optional, tag = "4")]
    pub uid: Option<u32>,
}

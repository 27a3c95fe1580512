//! Privileged worker request host.
//!
//! The worker-side endpoint: a loopback-only WebSocket server speaking
//! binary protobuf frames. Each connection starts with a hello handshake
//! (protocol version + optional token), then serves two capabilities:
//! ownership lookups through the ancestry resolver and the filesystem
//! capability handle.
//!
//! # Resilience
//!
//! Every request handler runs under [`safe`]: a failure inside a handler
//! is logged and turned into the default/empty response for that request,
//! so one failing request can never take down the host process.
//!
//! # Security
//!
//! - Binds to `127.0.0.1` only (no network exposure)
//! - Non-loopback connections are rejected silently
//! - First frame must be a hello with the expected protocol version and,
//!   when configured, the handshake token; anything else closes the
//!   connection

mod handle;

pub use handle::HostHandle;

use crate::error::host::HostError;
use crate::resolver::enumerate::{ProcessEnumerator, SessionEnumerator};
use crate::resolver::{resolve_owner, ParentLinks, ProcfsParentLinks};
use crate::WORKER_HOSTNAME;

use common::{ErrorLocation, RedactedToken};
use models::wire::{
    client_frame, server_frame, ClientFrame, ErrorCode, ErrorResponse, FsCapabilityResponse,
    HelloResponse, ResolveOwnerResponse, ServerFrame, PROTOCOL_VERSION,
};

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use prost::Message as ProstMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Collaborators and policy for a host instance.
///
/// The enumerator and parent links are injected so the host can be
/// exercised against synthetic process trees.
pub struct HostOptions {
    /// Handshake token clients must present; `None` accepts any hello.
    pub token: Option<RedactedToken>,
    pub enumerator: Arc<dyn ProcessEnumerator>,
    pub links: Arc<dyn ParentLinks + Send + Sync>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            token: None,
            enumerator: Arc::new(SessionEnumerator),
            links: Arc::new(ProcfsParentLinks),
        }
    }
}

struct HostState {
    token: Option<RedactedToken>,
    enumerator: Arc<dyn ProcessEnumerator>,
    links: Arc<dyn ParentLinks + Send + Sync>,
    next_capability: AtomicU64,
}

/// Start the host on `127.0.0.1:<port>` (0 auto-selects).
///
/// Spawns a background accept loop and returns immediately. The server
/// runs until the process exits.
///
/// # Errors
///
/// Returns [`HostError::Io`] if the port is in use or cannot be bound.
pub async fn start_host(port: u16, options: HostOptions) -> Result<HostHandle, HostError> {
    let address = format!("{WORKER_HOSTNAME}:{port}");
    let listener = TcpListener::bind(&address).await?;
    let local_addr = listener.local_addr()?;

    info!("Privileged host listening on {local_addr}");

    let state = Arc::new(HostState {
        token: options.token,
        enumerator: options.enumerator,
        links: options.links,
        next_capability: AtomicU64::new(1),
    });

    TokioSpawn(async move {
        while let Ok((stream, addr)) = listener.accept().await {
            debug!("Client connecting from {addr}");
            TokioSpawn(handle_connection(stream, addr, Arc::clone(&state)));
        }
    });

    Ok(HostHandle::new(local_addr))
}

/// Handle one client connection: handshake first, then request dispatch.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<HostState>,
) -> Result<(), HostError> {
    // SECURITY: Reject non-loopback connections
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return Ok(()); // Silent rejection (don't give attackers info)
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            error!("WebSocket handshake failed: {e}");
            return Err(HostError::Handshake {
                message: format!("WebSocket handshake failed: {e}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };

    let (mut write, mut read) = ws_stream.split();

    // SECURITY: First frame MUST be the hello handshake
    if let Some(message) = read.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                let frame = ClientFrame::decode(&data[..])?;
                match frame.payload {
                    Some(client_frame::Payload::Hello(hello)) => {
                        if hello.protocol_version != PROTOCOL_VERSION {
                            warn!(
                                "Client {addr} speaks protocol {} but this worker speaks {}",
                                hello.protocol_version, PROTOCOL_VERSION
                            );
                            send_hello_response(
                                &mut write,
                                frame.request_id,
                                false,
                                Some("Unsupported protocol version"),
                            )
                            .await?;
                            return Ok(());
                        }

                        if !token_matches(&state.token, hello.token.as_deref()) {
                            warn!("Client {addr} hello failed: invalid token");
                            send_hello_response(
                                &mut write,
                                frame.request_id,
                                false,
                                Some("Invalid handshake token"),
                            )
                            .await?;
                            return Ok(());
                        }

                        info!("Client {addr} connected");
                        send_hello_response(&mut write, frame.request_id, true, None).await?;
                    }
                    _ => {
                        warn!("Client {addr} rejected: first frame was not a hello");
                        return Ok(()); // Close connection (no response)
                    }
                }
            }
            Ok(_) => {
                warn!("Client {addr} sent non-binary first frame");
                return Ok(());
            }
            Err(e) => {
                error!("Error reading first frame from {addr}: {e}");
                return Err(HostError::Read {
                    message: format!("Error reading first frame: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    } else {
        warn!("Client {addr} disconnected before the handshake");
        return Ok(());
    }

    // Main request loop (handshake completed)
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                let frame = match ClientFrame::decode(&data[..]) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to decode frame from {addr}: {e}");
                        send_error_response(&mut write, 0, ErrorCode::InvalidFrame, "Invalid frame")
                            .await?;
                        continue;
                    }
                };

                let request_id = frame.request_id;
                if let Some(payload) = frame.payload {
                    dispatch(payload, &state, request_id, &mut write).await?;
                } else {
                    warn!("Client {addr} sent frame with no payload");
                    send_error_response(
                        &mut write,
                        request_id,
                        ErrorCode::InvalidFrame,
                        "No payload in frame",
                    )
                    .await?;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                warn!("Client {addr} sent non-binary frame after the handshake");
                // Ignore non-binary frames
            }
            Err(e) => {
                error!("Error reading frame from {addr}: {e}");
                return Err(HostError::Read {
                    message: format!("Error reading frame: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }

    info!("Client {addr} disconnected");
    Ok(())
}

fn token_matches(expected: &Option<RedactedToken>, presented: Option<&str>) -> bool {
    match expected {
        Some(expected) => presented == Some(expected.as_str()),
        None => true,
    }
}

/// Route one request payload to its handler.
async fn dispatch(
    payload: client_frame::Payload,
    state: &HostState,
    request_id: u64,
    write: &mut WsWriter,
) -> Result<(), HostError> {
    match payload {
        client_frame::Payload::ResolveOwner(request) => {
            let process = safe(None, || {
                let snapshot = state.enumerator.snapshot();
                resolve_owner(request.pid, &snapshot, state.links.as_ref())
            });

            let response = ServerFrame {
                request_id,
                payload: Some(server_frame::Payload::ResolveOwner(ResolveOwnerResponse {
                    process,
                })),
            };
            send_frame(write, &response).await
        }

        client_frame::Payload::FsCapability(_) => {
            let capability = state.next_capability.fetch_add(1, Ordering::Relaxed);
            debug!("Issued filesystem capability {capability}");

            let response = ServerFrame {
                request_id,
                payload: Some(server_frame::Payload::FsCapability(FsCapabilityResponse {
                    capability,
                })),
            };
            send_frame(write, &response).await
        }

        // Hello must not appear after the handshake
        client_frame::Payload::Hello(_) => {
            send_error_response(
                write,
                request_id,
                ErrorCode::Rejected,
                "Handshake already completed",
            )
            .await
        }
    }
}

/// Run a request handler, converting any panic into the default result.
///
/// A single failing request must not crash the host process; the caller
/// gets the empty response and the failure lands in the log.
fn safe<T>(default: T, handler: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(handler)) {
        Ok(value) => value,
        Err(_) => {
            error!("Request handler panicked, returning default result");
            default
        }
    }
}

async fn send_hello_response(
    write: &mut WsWriter,
    request_id: u64,
    accepted: bool,
    error: Option<&str>,
) -> Result<(), HostError> {
    let response = ServerFrame {
        request_id,
        payload: Some(server_frame::Payload::Hello(HelloResponse {
            accepted,
            worker_pid: std::process::id(),
            error: error.map(|e| e.to_string()),
        })),
    };
    send_frame(write, &response).await
}

async fn send_error_response(
    write: &mut WsWriter,
    request_id: u64,
    error_code: ErrorCode,
    error_message: &str,
) -> Result<(), HostError> {
    let response = ServerFrame {
        request_id,
        payload: Some(server_frame::Payload::Error(ErrorResponse {
            code: error_code as i32,
            message: error_message.to_string(),
        })),
    };
    send_frame(write, &response).await
}

async fn send_frame(write: &mut WsWriter, response: &ServerFrame) -> Result<(), HostError> {
    write
        .send(Message::Binary(response.encode_to_vec().into()))
        .await
        .map_err(|e| HostError::Send {
            message: format!("Failed to send response: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

//! Client side of a live worker connection.
//!
//! [`connect`] dials the worker, performs the hello handshake and returns
//! a [`RemoteHandle`]: a cloneable handle multiplexing request/response
//! pairs over one WebSocket. Responses are correlated by request id
//! through a pending map drained by a background read loop; when the
//! stream ends the loop resolves [`RemoteHandle::closed`], which is the
//! disconnect signal the connector's binding waits on.
//!
//! Handles are replaced wholesale on every reconnect. A clone that
//! outlives its connection fails with [`RemoteError::Closed`]; callers
//! re-fetch from the connector instead of caching across a disconnect.

use crate::error::remote::RemoteError;

use common::ErrorLocation;
use models::wire::{
    client_frame, server_frame, ClientFrame, FsCapabilityRequest, HelloRequest, HelloResponse,
    ResolveOwnerRequest, ServerFrame, HELLO_REQUEST_ID, PROTOCOL_VERSION,
};
use models::ProcessInfo;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use prost::Message as ProstMessage;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type PendingMap = Arc<AsyncMutex<HashMap<u64, oneshot::Sender<server_frame::Payload>>>>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Hello exchanges use ids below this; correlated requests start here.
const FIRST_REQUEST_ID: u64 = HELLO_REQUEST_ID + 1;

/// Connect to a worker endpoint and perform the hello handshake.
///
/// # Arguments
///
/// * `base_url` - Worker endpoint, e.g. `ws://127.0.0.1:4096`
/// * `token` - Handshake token, required when the worker was started
///   with one
///
/// # Errors
///
/// * [`RemoteError::Connect`] - URL invalid or worker unreachable
/// * [`RemoteError::Handshake`] - worker rejected the hello (version or
///   token mismatch)
pub async fn connect(base_url: &str, token: Option<&str>) -> Result<RemoteHandle, RemoteError> {
    let url = Url::parse(base_url).map_err(|e| RemoteError::Connect {
        message: format!("Invalid worker URL {base_url}: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let (mut stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| RemoteError::Connect {
            message: format!("Failed to connect to {base_url}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let hello = client_hello(&mut stream, token).await?;
    debug!("Connected to worker pid {} at {base_url}", hello.worker_pid);

    Ok(RemoteHandle::start(stream, hello.worker_pid))
}

/// Send the hello frame and wait for the worker's verdict.
pub(crate) async fn client_hello(
    stream: &mut WsStream,
    token: Option<&str>,
) -> Result<HelloResponse, RemoteError> {
    let frame = ClientFrame {
        request_id: HELLO_REQUEST_ID,
        payload: Some(client_frame::Payload::Hello(HelloRequest {
            protocol_version: PROTOCOL_VERSION,
            token: token.map(str::to_string),
        })),
    };

    stream
        .send(Message::Binary(frame.encode_to_vec().into()))
        .await
        .map_err(|e| RemoteError::Send {
            message: format!("Failed to send hello: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                let frame = ServerFrame::decode(&data[..])?;
                return match frame.payload {
                    Some(server_frame::Payload::Hello(hello)) if hello.accepted => Ok(hello),
                    Some(server_frame::Payload::Hello(hello)) => Err(RemoteError::Handshake {
                        message: hello
                            .error
                            .unwrap_or_else(|| String::from("Worker rejected hello")),
                        location: ErrorLocation::from(Location::caller()),
                    }),
                    _ => Err(RemoteError::Read {
                        message: String::from("First worker frame was not a hello response"),
                        location: ErrorLocation::from(Location::caller()),
                    }),
                };
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(RemoteError::Read {
                    message: format!("Error reading hello response: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }

    Err(RemoteError::Closed {
        message: String::from("Worker closed the connection during the handshake"),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Handle to one live worker connection.
#[derive(Clone)]
pub struct RemoteHandle {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    worker_pid: u32,
    writer: AsyncMutex<WsSink>,
    pending: PendingMap,
    next_request_id: AtomicU64,
    closed_rx: watch::Receiver<bool>,
}

impl RemoteHandle {
    /// Take over a post-handshake stream: split it and spawn the read loop.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn start(stream: WsStream, worker_pid: u32) -> Self {
        let (writer, source) = stream.split();
        let pending: PendingMap = Arc::new(AsyncMutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(read_loop(source, Arc::clone(&pending), closed_tx));

        Self {
            inner: Arc::new(RemoteInner {
                worker_pid,
                writer: AsyncMutex::new(writer),
                pending,
                next_request_id: AtomicU64::new(FIRST_REQUEST_ID),
                closed_rx,
            }),
        }
    }

    /// Pid of the worker process behind this connection.
    pub fn worker_pid(&self) -> u32 {
        self.inner.worker_pid
    }

    /// Resolve the known process owning `pid` on the worker side.
    ///
    /// Returns `Ok(None)` when no ancestor of `pid` is known - including
    /// when `pid` died mid-walk on the worker. Transport failures are the
    /// only errors.
    pub async fn resolve_owner(&self, pid: u32) -> Result<Option<ProcessInfo>, RemoteError> {
        let payload = client_frame::Payload::ResolveOwner(ResolveOwnerRequest { pid });
        match self.request(payload).await? {
            server_frame::Payload::ResolveOwner(response) => Ok(response.process),
            other => Err(unexpected_payload("resolve_owner", &other)),
        }
    }

    /// Request the worker's filesystem capability id.
    pub(crate) async fn fs_capability(&self) -> Result<u64, RemoteError> {
        let payload = client_frame::Payload::FsCapability(FsCapabilityRequest {});
        match self.request(payload).await? {
            server_frame::Payload::FsCapability(response) => Ok(response.capability),
            other => Err(unexpected_payload("fs_capability", &other)),
        }
    }

    /// Whether the underlying connection has ended.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed_rx.borrow()
    }

    /// Resolve once the underlying connection ends.
    pub async fn closed(&self) {
        let mut closed_rx = self.inner.closed_rx.clone();
        while !*closed_rx.borrow_and_update() {
            if closed_rx.changed().await.is_err() {
                break;
            }
        }
    }

    async fn request(
        &self,
        payload: client_frame::Payload,
    ) -> Result<server_frame::Payload, RemoteError> {
        if self.is_closed() {
            return Err(RemoteError::Closed {
                message: String::from("Connection already closed"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (response_tx, response_rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .await
            .insert(request_id, response_tx);

        let frame = ClientFrame {
            request_id,
            payload: Some(payload),
        };

        let sent = self
            .inner
            .writer
            .lock()
            .await
            .send(Message::Binary(frame.encode_to_vec().into()))
            .await;

        if let Err(e) = sent {
            self.inner.pending.lock().await.remove(&request_id);
            return Err(RemoteError::Send {
                message: format!("Failed to send request {request_id}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, response_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RemoteError::Closed {
                message: format!("Connection closed before response to request {request_id}"),
                location: ErrorLocation::from(Location::caller()),
            }),
            Err(_) => {
                self.inner.pending.lock().await.remove(&request_id);
                Err(RemoteError::Timeout {
                    message: format!(
                        "No response to request {request_id} within {REQUEST_TIMEOUT:?}"
                    ),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        }
    }
}

#[track_caller]
fn unexpected_payload(operation: &str, payload: &server_frame::Payload) -> RemoteError {
    if let server_frame::Payload::Error(error) = payload {
        return RemoteError::Rejected {
            message: format!(
                "Worker rejected {operation}: code {} - {}",
                error.code, error.message
            ),
            location: ErrorLocation::from(Location::caller()),
        };
    }
    RemoteError::Read {
        message: format!("Unexpected response payload for {operation}"),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Route inbound frames to their pending requests until the stream ends.
async fn read_loop(mut source: WsSource, pending: PendingMap, closed_tx: watch::Sender<bool>) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Binary(data)) => match ServerFrame::decode(&data[..]) {
                Ok(frame) => {
                    let Some(payload) = frame.payload else {
                        warn!("Worker frame {} had no payload", frame.request_id);
                        continue;
                    };
                    match pending.lock().await.remove(&frame.request_id) {
                        Some(response_tx) => {
                            // Receiver may have timed out; nothing to do then.
                            let _ = response_tx.send(payload);
                        }
                        None => {
                            trace!("Dropping frame for unknown request {}", frame.request_id);
                        }
                    }
                }
                Err(e) => warn!("Failed to decode worker frame: {e}"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Worker stream error: {e}");
                break;
            }
        }
    }

    // Fail pending requests before publishing the closed state.
    pending.lock().await.clear();
    let _ = closed_tx.send(true);
    debug!("Worker connection closed");
}

/// Filesystem capability brokered through the connected worker.
#[derive(Clone)]
pub struct RemoteFs {
    handle: RemoteHandle,
    capability: u64,
}

impl RemoteFs {
    /// Acquire the filesystem capability over an established connection.
    pub async fn acquire(handle: &RemoteHandle) -> Result<Self, RemoteError> {
        let capability = handle.fs_capability().await?;
        debug!("Acquired filesystem capability {capability}");
        Ok(Self {
            handle: handle.clone(),
            capability,
        })
    }

    /// Opaque capability id issued by the worker for this connection.
    pub fn capability(&self) -> u64 {
        self.capability
    }

    /// Whether the backing connection is still alive.
    pub fn is_connected(&self) -> bool {
        !self.handle.is_closed()
    }
}

/// Filesystem access as published by the connector.
///
/// Readers take a fresh copy per use; a `Remote` value cached across a
/// disconnect goes stale and must be re-fetched.
#[derive(Clone, Default)]
pub enum FsAccess {
    /// Direct access in this process, no worker involved.
    #[default]
    Local,
    /// Access brokered through the connected worker.
    Remote(RemoteFs),
}

impl FsAccess {
    pub fn is_remote(&self) -> bool {
        matches!(self, FsAccess::Remote(_))
    }
}

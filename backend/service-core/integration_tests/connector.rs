// Public API tests for the connector against a live in-process host.
// Connect/disconnect events are driven manually through the observer
// interface, exactly as a binding delivers them.

use crate::helpers::{base_url, process_entry, start_test_host};

use service_core::connector::binding::WorkerBinding;
use service_core::connector::{ConnectionObserver, ConnectionState, ServiceConnector};
use service_core::remote::{self, RemoteFs, RemoteHandle};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Binding driven by the test instead of a spawned worker.
#[derive(Default)]
struct ManualBinding {
    bind_calls: AtomicUsize,
}

impl WorkerBinding for ManualBinding {
    fn bind(&self, _observer: Arc<dyn ConnectionObserver>) {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
    }
}

async fn connect_pair(url: &str) -> (RemoteHandle, RemoteFs) {
    let handle = remote::connect(url, None).await.expect("connect must work");
    let fs = RemoteFs::acquire(&handle).await.expect("fs must be acquirable");
    (handle, fs)
}

/// **VALUE**: Verifies that a caller blocked before the connect observes the handle after it.
///
/// **WHY THIS MATTERS**: This is the core synchronization promise: the gate is
/// signalled only after the handle is stored, so a released waiter always
/// finds a usable handle - no torn reads, no null after a successful wait.
///
/// **BUG THIS CATCHES**: Would catch the signal being emitted before the slot
/// write, which surfaces as rare startup nulls under load.
#[tokio::test(flavor = "multi_thread")]
async fn given_blocked_caller_when_worker_connects_then_caller_gets_live_handle() {
    // GIVEN: A connector with a caller blocked off-runtime
    let host = start_test_host(vec![process_entry(5, "term")], &[(10, 5)], None).await;
    let connector = ServiceConnector::with_privilege(Arc::new(ManualBinding::default()), true);

    let waiter = {
        let connector = Arc::clone(&connector);
        thread::spawn(move || connector.remote_timeout(Duration::from_secs(10)))
    };
    thread::sleep(Duration::from_millis(100));

    // WHEN: The worker connects
    let (handle, fs) = connect_pair(&base_url(&host)).await;
    connector.on_connected(handle, fs);

    // THEN: The released waiter holds a handle that actually works
    let held = waiter.join().unwrap().expect("waiter must observe the handle");
    let owner = held.resolve_owner(10).await.unwrap();
    assert_eq!(owner.map(|p| p.pid), Some(5));
    assert_eq!(connector.state(), ConnectionState::Connected);
    assert!(connector.filesystem().is_remote());
}

/// **VALUE**: Verifies reconnect liveness: a waiter parked across a disconnect is freed by the reconnect.
///
/// **WHY THIS MATTERS**: Worker crashes are routine (kill, privilege
/// revocation). Callers blocked through the outage must resume with the new
/// connection's handle - a permanent block here is the bug this whole design
/// exists to prevent.
///
/// **BUG THIS CATCHES**: Would catch the gate not re-opening after a
/// reset/signal cycle, or the slot still holding the dead connection's handle.
#[tokio::test(flavor = "multi_thread")]
async fn given_waiter_parked_across_disconnect_when_reconnected_then_waiter_resumes() {
    // GIVEN: A bound, connected connector
    let host = start_test_host(vec![process_entry(5, "term")], &[(10, 5)], None).await;
    let binding = Arc::new(ManualBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), true);
    connector.ensure_bound();
    let (handle, fs) = connect_pair(&base_url(&host)).await;
    connector.on_connected(handle, fs);

    // WHEN: The worker disconnects with a caller arriving during the outage
    connector.on_disconnected();
    assert!(connector.try_remote().is_none(), "Slot must clear on disconnect");
    assert!(!connector.filesystem().is_remote());

    let waiter = {
        let connector = Arc::clone(&connector);
        thread::spawn(move || connector.remote_timeout(Duration::from_secs(10)))
    };
    thread::sleep(Duration::from_millis(100));

    // AND: A new connection comes up
    let (handle, fs) = connect_pair(&base_url(&host)).await;
    connector.on_connected(handle, fs);

    // THEN: The parked waiter resumes with the fresh handle
    let held = waiter.join().unwrap().expect("waiter must observe the new handle");
    assert_eq!(held.resolve_owner(10).await.unwrap().map(|p| p.pid), Some(5));

    // AND: The disconnect issued exactly one re-bind
    assert_eq!(binding.bind_calls.load(Ordering::SeqCst), 2);
}

/// **VALUE**: Verifies that a handle outliving its connection fails closed.
///
/// **WHY THIS MATTERS**: Consumers are told to re-fetch instead of caching
/// across a disconnect; the enforcement is that a stale clone reports closed
/// and fails requests fast rather than hanging on a dead socket. The closed
/// signal is also what the binding uses to detect the disconnect at all.
///
/// **BUG THIS CATCHES**: Would catch stale requests waiting out the full
/// request timeout instead of failing once the read loop ended, or closed()
/// never resolving when the peer goes away without a close frame.
#[tokio::test(flavor = "multi_thread")]
async fn given_connection_severed_when_using_stale_handle_then_fails_closed() {
    use futures_util::{SinkExt, StreamExt};
    use models::wire::{server_frame, ClientFrame, HelloResponse, ServerFrame};
    use prost::Message as ProstMessage;
    use tokio_tungstenite::tungstenite::Message;

    // GIVEN: A minimal worker endpoint the test can sever at will
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Answer the hello, then drop the stream without a close frame.
        let hello = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Binary(data) => break ClientFrame::decode(&data[..]).unwrap(),
                _ => continue,
            }
        };
        let response = ServerFrame {
            request_id: hello.request_id,
            payload: Some(server_frame::Payload::Hello(HelloResponse {
                accepted: true,
                worker_pid: 4242,
                error: None,
            })),
        };
        ws.send(Message::Binary(response.encode_to_vec().into()))
            .await
            .unwrap();
    });

    let handle = remote::connect(&format!("ws://127.0.0.1:{port}"), None)
        .await
        .unwrap();
    assert_eq!(handle.worker_pid(), 4242);
    server.await.unwrap();

    // WHEN: The connection ends
    handle.closed().await;

    // THEN: The stale handle reports closed and fails requests fast
    assert!(handle.is_closed());
    assert!(handle.resolve_owner(10).await.is_err());
}

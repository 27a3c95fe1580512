// Public API tests for the host and remote handle over a real loopback
// WebSocket with synthetic process state.

use crate::helpers::{base_url, process_entry, start_panicking_host, start_test_host};

use futures_util::{SinkExt, StreamExt};
use models::wire::{
    client_frame, server_frame, ClientFrame, HelloRequest, ServerFrame, HELLO_REQUEST_ID,
};
use prost::Message as ProstMessage;
use service_core::remote::{self, RemoteFs};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// **VALUE**: Verifies the full ownership lookup round trip over the wire.
///
/// **WHY THIS MATTERS**: This is the worker's primary capability: a client
/// asks about an arbitrary pid and gets back the known process owning it,
/// resolved through live parent links on the worker side.
///
/// **BUG THIS CATCHES**: Would catch frame routing returning the wrong
/// response type, the resolver walking the wrong direction, or request id
/// correlation mixing up concurrent responses.
#[tokio::test]
async fn given_known_ancestor_when_resolving_over_wire_then_returns_owner() {
    // GIVEN: A host knowing pid 5, with chain 10 -> 7 -> 5 -> 1
    let host = start_test_host(
        vec![process_entry(5, "term")],
        &[(10, 7), (7, 5), (5, 1)],
        None,
    )
    .await;
    let handle = remote::connect(&base_url(&host), None).await.unwrap();

    // WHEN: Resolving the leaf pid
    let owner = handle.resolve_owner(10).await.unwrap();

    // THEN: The known session leader comes back
    assert_eq!(owner.map(|p| (p.pid, p.name)), Some((5, String::from("term"))));

    // AND: A pid with no known ancestor resolves to None, not an error
    assert!(handle.resolve_owner(999).await.unwrap().is_none());
}

/// **VALUE**: Verifies filesystem capability acquisition and per-request ids.
///
/// **WHY THIS MATTERS**: The capability id is the opaque handle the remote
/// filesystem layer is built on; it must be issued per request so each
/// derived handle is distinguishable.
///
/// **BUG THIS CATCHES**: Would catch the capability counter resetting or the
/// response carrying a constant.
#[tokio::test]
async fn given_connected_handle_when_acquiring_fs_capability_then_returns_distinct_ids() {
    // GIVEN: A connected handle
    let host = start_test_host(vec![], &[], None).await;
    let handle = remote::connect(&base_url(&host), None).await.unwrap();

    // WHEN: Acquiring the capability twice
    let fs_first = RemoteFs::acquire(&handle).await.unwrap();
    let fs_second = RemoteFs::acquire(&handle).await.unwrap();

    // THEN: Both are valid and distinct
    assert!(fs_first.capability() >= 1);
    assert_ne!(fs_first.capability(), fs_second.capability());
    assert!(fs_first.is_connected());
}

/// **VALUE**: Verifies that a wrong handshake token is rejected and the right one accepted.
///
/// **WHY THIS MATTERS**: The token is what keeps other local users from
/// driving a privileged worker they did not start. Rejection must be explicit
/// so clients distinguish "worker busy" from "not yours".
///
/// **BUG THIS CATCHES**: Would catch the token comparison being skipped or
/// inverted.
#[tokio::test]
async fn given_tokened_host_when_connecting_then_token_decides_acceptance() {
    // GIVEN: A host requiring a token
    let host = start_test_host(vec![], &[], Some("expected-token")).await;
    let url = base_url(&host);

    // WHEN/THEN: The wrong token is rejected
    assert!(remote::connect(&url, Some("wrong-token")).await.is_err());

    // AND: A missing token is rejected
    assert!(remote::connect(&url, None).await.is_err());

    // AND: The right token connects
    assert!(remote::connect(&url, Some("expected-token")).await.is_ok());
}

/// **VALUE**: Verifies that an unsupported protocol version is rejected in the hello.
///
/// **WHY THIS MATTERS**: A version mismatch after the handshake shows up as
/// confusing decode errors; rejecting it in the hello gives the client a
/// clear, actionable failure.
///
/// **BUG THIS CATCHES**: Would catch the version check being dropped from the
/// handshake path.
#[tokio::test]
async fn given_wrong_protocol_version_when_hello_sent_then_rejected() {
    // GIVEN: A raw connection speaking a future protocol version
    let host = start_test_host(vec![], &[], None).await;
    let (mut stream, _) = connect_async(base_url(&host)).await.unwrap();

    let hello = ClientFrame {
        request_id: HELLO_REQUEST_ID,
        payload: Some(client_frame::Payload::Hello(HelloRequest {
            protocol_version: 999,
            token: None,
        })),
    };

    // WHEN: Sending the hello
    stream
        .send(Message::Binary(hello.encode_to_vec().into()))
        .await
        .unwrap();

    // THEN: The worker answers with a rejection
    let response = loop {
        match stream.next().await.expect("worker must answer") {
            Ok(Message::Binary(data)) => break ServerFrame::decode(&data[..]).unwrap(),
            Ok(_) => continue,
            Err(e) => panic!("read failed: {e}"),
        }
    };

    match response.payload {
        Some(server_frame::Payload::Hello(hello)) => {
            assert!(!hello.accepted, "Future protocol version must be rejected");
            assert!(hello.error.is_some());
        }
        _ => panic!("expected a hello response"),
    }
}

/// **VALUE**: Verifies that a failing request handler degrades to the empty result.
///
/// **WHY THIS MATTERS**: One failing request must never take down the worker:
/// it serves every client on the machine. The contract is a default result
/// for the failing request and business as usual afterwards.
///
/// **BUG THIS CATCHES**: Would catch the failure containment being removed,
/// which turns this test into a dropped connection instead of two clean
/// responses.
#[tokio::test]
async fn given_panicking_enumerator_when_resolving_then_empty_result_and_host_survives() {
    // GIVEN: A host whose enumerator panics on every snapshot
    let host = start_panicking_host().await;
    let handle = remote::connect(&base_url(&host), None).await.unwrap();

    // WHEN: Resolving (the handler dies internally)
    let owner = handle.resolve_owner(10).await.unwrap();

    // THEN: The empty result, not a crash
    assert!(owner.is_none());

    // AND: The same connection still serves later requests
    let fs = RemoteFs::acquire(&handle).await.unwrap();
    assert!(fs.capability() >= 1);
}

// Unit tests for the connector lifecycle with a mock binding
// Tests that need a live RemoteHandle are in integration_tests/connector.rs

use crate::connector::binding::WorkerBinding;
use crate::connector::{ConnectionObserver, ConnectionState, ServiceConnector};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Binding that records bind requests without ever connecting.
#[derive(Default)]
struct MockBinding {
    bind_calls: AtomicUsize,
}

impl MockBinding {
    fn calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }
}

impl WorkerBinding for MockBinding {
    fn bind(&self, _observer: Arc<dyn ConnectionObserver>) {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// **VALUE**: Verifies that concurrent ensure_bound calls issue exactly one bind.
///
/// **WHY THIS MATTERS**: Every accessor calls ensure_bound on its way in, so
/// dozens of threads hit this path at startup simultaneously. Each duplicate
/// bind would spawn another worker connect cycle, ending with several
/// connections fighting over one handle slot.
///
/// **BUG THIS CATCHES**: Would catch the state transition being check-then-set
/// instead of compare-and-swap, which loses the race and double-binds.
#[test]
fn given_concurrent_ensure_bound_when_unbound_then_exactly_one_bind_issued() {
    // GIVEN: An unbound connector and eight racing threads
    let binding = Arc::new(MockBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), true);
    let barrier = Arc::new(Barrier::new(8));

    // WHEN: All threads call ensure_bound at once
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let connector = Arc::clone(&connector);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                connector.ensure_bound();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // THEN: Exactly one physical bind request was issued
    assert_eq!(binding.calls(), 1);
    assert_eq!(connector.state(), ConnectionState::Binding);
}

/// **VALUE**: Verifies that ensure_bound is a no-op once binding or connected.
///
/// **WHY THIS MATTERS**: The state machine never returns to Unbound; repeated
/// ensure_bound calls over the process lifetime must all be free.
///
/// **BUG THIS CATCHES**: Would catch a transition that re-arms Unbound and
/// re-binds on every accessor call.
#[test]
fn given_binding_connector_when_ensure_bound_again_then_no_second_bind() {
    // GIVEN: A connector that already requested its bind
    let binding = Arc::new(MockBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), true);
    connector.ensure_bound();

    // WHEN: Calling ensure_bound repeatedly
    connector.ensure_bound();
    connector.ensure_bound();

    // THEN: Still exactly one bind
    assert_eq!(binding.calls(), 1);
}

/// **VALUE**: Verifies exactly one re-bind per disconnect, however many waiters hang.
///
/// **WHY THIS MATTERS**: The disconnect callback is the only re-bind trigger;
/// if each pending waiter also re-issued a bind, a single worker crash with N
/// blocked callers would spawn N reconnect cycles.
///
/// **BUG THIS CATCHES**: Would catch accessors re-binding on wakeup or the
/// disconnect path binding more than once.
#[test]
fn given_disconnect_with_pending_waiters_when_handled_then_single_rebind() {
    // GIVEN: A bound connector with three waiters parked on the gate
    let binding = Arc::new(MockBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), true);
    connector.ensure_bound();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let connector = Arc::clone(&connector);
            thread::spawn(move || connector.remote_timeout(Duration::from_millis(200)))
        })
        .collect();
    thread::sleep(Duration::from_millis(50));

    // WHEN: One disconnect event arrives
    connector.on_disconnected();
    for waiter in waiters {
        // No worker ever connects, so the degraded result is None
        assert!(waiter.join().unwrap().is_none());
    }

    // THEN: The initial bind plus exactly one re-bind
    assert_eq!(binding.calls(), 2);
    assert_eq!(connector.state(), ConnectionState::Binding);
}

/// **VALUE**: Verifies the blocking accessor degrades instead of blocking on a runtime thread.
///
/// **WHY THIS MATTERS**: The tokio runtime also delivers the connect callback.
/// A blocking wait on a runtime thread can therefore deadlock the process -
/// the misuse the design must make structurally harmless.
///
/// **BUG THIS CATCHES**: Would catch the runtime-context check being dropped,
/// which turns this test into a 30-second hang instead of a fast None.
#[tokio::test]
async fn given_runtime_thread_when_remote_called_then_returns_degraded_without_blocking() {
    // GIVEN: A connector with no worker, called from a runtime thread
    let binding = Arc::new(MockBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), true);

    // WHEN: Calling the blocking accessor
    let start = Instant::now();
    let remote = connector.remote();

    // THEN: A bounded, degraded result - no block
    assert!(remote.is_none());
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "Accessor must not block on a runtime thread"
    );
    // The bind was still requested
    assert_eq!(binding.calls(), 1);
}

/// **VALUE**: Verifies that without elevation nothing binds and accessors return fast.
///
/// **WHY THIS MATTERS**: Privilege absence is permanent for the process
/// lifetime. Binding anyway would wait forever on a worker that can never be
/// reached; the accessors must return the degraded result immediately instead
/// of relying on callers to add timeouts.
///
/// **BUG THIS CATCHES**: Would catch the privilege precondition being checked
/// after the state transition, leaving the connector stuck in Binding.
#[test]
fn given_unprivileged_connector_when_used_then_never_binds_and_never_blocks() {
    // GIVEN: A connector without elevated access
    let binding = Arc::new(MockBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), false);

    // WHEN: Driving it like a normal caller
    connector.ensure_bound();
    let start = Instant::now();
    let remote = connector.remote();

    // THEN: No bind, no block, degraded result
    assert_eq!(binding.calls(), 0);
    assert!(remote.is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(connector.state(), ConnectionState::Unbound);
    assert!(!connector.is_privileged());
}

/// **VALUE**: Verifies the state machine transitions of a disconnect without a prior connect.
///
/// **WHY THIS MATTERS**: Bind cycles can fail before ever connecting; the
/// disconnect path must still leave consistent state (Binding, closed gate,
/// empty slot) so the next cycle starts clean.
///
/// **BUG THIS CATCHES**: Would catch disconnect handling that assumes a stored
/// handle and panics on the empty slot.
#[test]
fn given_disconnect_when_no_handle_stored_then_state_stays_consistent() {
    // GIVEN: A connector in Binding with nothing stored
    let binding = Arc::new(MockBinding::default());
    let connector = ServiceConnector::with_privilege(binding.clone(), true);
    connector.ensure_bound();

    // WHEN: A disconnect arrives anyway
    connector.on_disconnected();

    // THEN: Consistent degraded state
    assert_eq!(connector.state(), ConnectionState::Binding);
    assert!(connector.try_remote().is_none());
    assert!(!connector.filesystem().is_remote());
}

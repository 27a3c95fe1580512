//! Resettable connection gate.
//!
//! A single-permit latch that stays closed until a successful worker
//! connection signals it open, and is closed again by every disconnect.
//! A one-shot latch cannot express the reconnect cycle and a counting
//! semaphore tracks more state than exists - there is exactly one
//! "worker is ready" fact - so the gate is a binary state machine behind
//! a condition variable.
//!
//! # Invariant
//!
//! The permit is always 0 (open, waiters pass) or 1 (closed, waiters
//! block). Only [`ConnectionGate::signal`] moves 1 -> 0 and only
//! [`ConnectionGate::reset`] moves back to 1; both transitions happen
//! under the permit lock, so concurrent callers cannot corrupt the count.
//! Waiters never consume the permit - one `signal` releases all of them,
//! and a timed-out waiter leaves the permit untouched.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

const CLOSED: u8 = 1;
const OPEN: u8 = 0;

/// Resettable single-permit blocking latch.
pub struct ConnectionGate {
    permit: Mutex<u8>,
    readiness: Condvar,
}

impl ConnectionGate {
    /// Create a gate in the closed state.
    pub fn new() -> Self {
        Self {
            permit: Mutex::new(CLOSED),
            readiness: Condvar::new(),
        }
    }

    /// Close the gate. Subsequent [`wait`](Self::wait) calls block until
    /// the next [`signal`](Self::signal).
    pub fn reset(&self) {
        let mut permit = self.permit.lock();
        *permit = CLOSED;
    }

    /// Open the gate and wake every blocked waiter.
    ///
    /// Idempotent: signalling an already-open gate is a no-op.
    pub fn signal(&self) {
        let mut permit = self.permit.lock();
        if *permit == CLOSED {
            *permit = OPEN;
            self.readiness.notify_all();
        }
    }

    /// Block the calling thread until the gate is open.
    ///
    /// Safe to call from any number of threads; all of them are released
    /// together by one `signal`. Must not be called on a runtime thread -
    /// see [`crate::connector::ServiceConnector`], which enforces that
    /// structurally.
    pub fn wait(&self) {
        let mut permit = self.permit.lock();
        while *permit != OPEN {
            self.readiness.wait(&mut permit);
        }
    }

    /// Block until the gate is open or `timeout` elapses.
    ///
    /// Returns `true` when the gate was open on exit. A timed-out wait is
    /// the cancellation path: it leaves the permit exactly as it found it,
    /// so an aborted waiter cannot starve the others.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permit = self.permit.lock();
        while *permit != OPEN {
            if self
                .readiness
                .wait_until(&mut permit, deadline)
                .timed_out()
            {
                return *permit == OPEN;
            }
        }
        true
    }

    /// Non-blocking readiness probe.
    pub fn try_wait(&self) -> bool {
        *self.permit.lock() == OPEN
    }
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new()
    }
}

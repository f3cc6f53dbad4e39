//! Observable connection state.
//!
//! [`ConnectionState`] is the snapshot callers read; [`StateCell`] is the
//! shared cell behind it. Only the manager's event loop writes the cell,
//! so every invariant below is enforced by a single writer:
//!
//! - At most one of `connected`/`connecting` is true at any instant.
//! - `reconnect_attempts` only grows between successful opens and resets
//!   to zero on each open.
//! - `connection_id` is `Some` iff `connected` is true.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::protocol::Envelope;

// ============================================================================
// ConnectionState
// ============================================================================

/// Point-in-time snapshot of the connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// A transport is open and carrying traffic.
    pub connected: bool,

    /// A connection attempt is in flight.
    pub connecting: bool,

    /// Retries scheduled since the last successful open.
    pub reconnect_attempts: u32,

    /// Most recently received envelope (last-write-wins).
    pub last_message: Option<Envelope>,

    /// Identity of the current connection; fresh per successful open.
    pub connection_id: Option<Uuid>,

    /// Last recorded error, cleared at the start of each connect attempt.
    pub error: Option<String>,
}

impl ConnectionState {
    /// Returns `true` when neither connected nor connecting.
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.connected && !self.connecting
    }
}

// ============================================================================
// StateCell
// ============================================================================

/// Shared cell holding the connection state and the queue depth gauge.
///
/// Handles read; the event loop is the single writer.
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    /// The state snapshot.
    state: Arc<RwLock<ConnectionState>>,

    /// Outbound queue depth, mirrored for lock-free reads.
    queue_depth: Arc<AtomicUsize>,
}

impl StateCell {
    /// Creates an idle cell.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the current state.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Returns the current outbound queue depth.
    #[inline]
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Applies a mutation to the state.
    ///
    /// Event-loop only.
    pub(crate) fn update(&self, mutate: impl FnOnce(&mut ConnectionState)) {
        let mut guard = self.state.write();
        mutate(&mut guard);
    }

    /// Publishes the current queue depth.
    ///
    /// Event-loop only.
    pub(crate) fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }
}

// ============================================================================
// Tests
// ============================================================================

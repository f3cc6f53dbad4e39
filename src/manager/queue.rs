//! Outbound message queue.
//!
//! Holds envelopes that could not be transmitted because no connection
//! is open. Drained strictly in insertion order on the next successful
//! open; a mid-flush send failure stops the drain and leaves the
//! remainder intact. Entries are not deduplicated and not persisted.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::error::Result;
use crate::protocol::Envelope;

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO buffer of envelopes awaiting a connection.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    /// Queued envelopes, head = oldest.
    entries: VecDeque<Envelope>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an envelope to the tail.
    #[inline]
    pub fn enqueue(&mut self, envelope: Envelope) {
        self.entries.push_back(envelope);
    }

    /// Returns the current depth.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains the queue head-to-tail through `send`.
    ///
    /// Each envelope is removed only after `send` succeeds; the first
    /// failure stops the drain with the failed envelope and everything
    /// behind it still queued, in order. Returns the number of envelopes
    /// sent.
    pub async fn flush<F>(&mut self, mut send: F) -> usize
    where
        F: AsyncFnMut(Envelope) -> Result<()>,
    {
        let mut sent = 0;

        while let Some(envelope) = self.entries.front() {
            if send(envelope.clone()).await.is_err() {
                break;
            }
            self.entries.pop_front();
            sent += 1;
        }

        sent
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Envelope message type.
//!
//! The envelope is the wire unit exchanged over the connection: a typed
//! payload plus a millisecond timestamp. It carries no behavior beyond
//! construction and classification helpers.
//!
//! # Reserved Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | `heartbeat` | Keep-alive traffic, sent by the client on a fixed cadence |
//!
//! Heartbeats are delivered to the message callback like any other
//! envelope; application logic is expected to filter them with
//! [`Envelope::is_heartbeat`].

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ============================================================================
// Constants
// ============================================================================

/// Reserved envelope type for keep-alive traffic.
pub const HEARTBEAT_TYPE: &str = "heartbeat";

/// Normal closure close code (RFC 6455).
pub const CLOSE_NORMAL: u16 = 1000;

/// Going-away close code (RFC 6455).
pub const CLOSE_GOING_AWAY: u16 = 1001;

// ============================================================================
// Envelope
// ============================================================================

/// A typed message exchanged over the connection.
///
/// Immutable once constructed.
///
/// # Format
///
/// ```json
/// {
///   "type": "chat",
///   "data": { ... },
///   "timestamp": 1735689600000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Implementation-defined payload.
    pub data: Value,

    /// Construction time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Envelope {
    /// Creates an envelope with an explicit timestamp.
    #[inline]
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value, timestamp: i64) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp,
        }
    }

    /// Creates an envelope stamped with the current time.
    #[inline]
    #[must_use]
    pub fn typed(message_type: impl Into<String>, data: Value) -> Self {
        Self::new(message_type, data, now_ms())
    }

    /// Creates a keep-alive envelope stamped with the current time.
    #[inline]
    #[must_use]
    pub fn heartbeat() -> Self {
        let now = now_ms();
        Self::new(HEARTBEAT_TYPE, json!({ "timestamp": now }), now)
    }

    /// Returns `true` if this is keep-alive traffic.
    #[inline]
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == HEARTBEAT_TYPE
    }
}

// ============================================================================
// Close Code Classification
// ============================================================================

/// Returns `true` if a close code signals an intentional close.
///
/// Normal closure (1000) and going-away (1001) are intentional and must
/// not trigger automatic reconnection; every other code is abnormal.
#[inline]
#[must_use]
pub const fn is_intentional_close(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}

// ============================================================================
// Helpers
// ============================================================================

/// Current time in milliseconds since the Unix epoch.
#[inline]
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

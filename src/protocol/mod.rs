//! Wire protocol types.
//!
//! This module defines the envelope format exchanged between the client
//! and the streaming backend, plus close-code classification.
//!
//! # Message Format
//!
//! Every message is a JSON envelope:
//!
//! ```json
//! { "type": "chat", "data": { ... }, "timestamp": 1735689600000 }
//! ```
//!
//! The `type` value `"heartbeat"` is reserved for keep-alive traffic.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope type and close-code helpers |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope message type and close-code helpers.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{
    CLOSE_GOING_AWAY, CLOSE_NORMAL, Envelope, HEARTBEAT_TYPE, is_intentional_close, now_ms,
};

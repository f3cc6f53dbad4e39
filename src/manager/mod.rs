//! Connection lifecycle management.
//!
//! This module contains the state machine that keeps one logical
//! WebSocket connection alive across network failures.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionManager`] | Handle driving the connection event loop |
//! | [`ConnectionState`] | Observable snapshot of the connection |
//! | [`ReconnectPolicy`] | Linear backoff retry schedule |
//! | [`OutboundQueue`] | FIFO buffer for sends while disconnected |
//! | [`VisibilityMonitor`] | Reconnect-on-foreground hook |
//!
//! # Example
//!
//! ```no_run
//! use chatlink::{Callbacks, ConnectionManager, ManagerConfig, Result};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let config = ManagerConfig::new("wss://chat.example.com/ws")?;
//! let callbacks = Callbacks::new()
//!     .with_on_message(|envelope| println!("got {}", envelope.message_type));
//!
//! let manager = ConnectionManager::spawn(config, callbacks);
//! manager.connect().await?;
//! manager.send_typed("chat", json!({"text": "hello"})).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Connection manager handle and event loop.
pub mod core;

/// Heartbeat timer.
pub mod heartbeat;

/// FIFO queue for envelopes sent while disconnected.
pub mod queue;

/// Linear backoff reconnection policy.
pub mod reconnect;

/// Observable connection state.
pub mod state;

/// Foreground/background visibility hook.
pub mod visibility;

#[cfg(test)]
pub(crate) mod support;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{ConnectionManager, SendStatus};
pub use queue::OutboundQueue;
pub use reconnect::{ReconnectPolicy, RetrySchedule};
pub use state::{ConnectionState, StateCell};
pub use visibility::{Visibility, VisibilityMonitor};

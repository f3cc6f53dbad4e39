//! Chatlink - Resilient WebSocket connection management.
//!
//! This library keeps one logical WebSocket connection alive for
//! real-time messaging clients: it dials, heartbeats, queues outbound
//! messages while offline, and recovers from abnormal closes with a
//! linear backoff schedule.
//!
//! # Architecture
//!
//! A [`ConnectionManager`] handle fronts a single event-loop task that
//! owns the connection and is the only mutator of its state:
//!
//! - Commands (connect, disconnect, reconnect, send) flow in over a
//!   channel and are applied in order
//! - Incoming frames, close events, and timer fires are handled by the
//!   same task, so no callback ever observes a half-applied transition
//! - State is published as cheap read-only snapshots
//!
//! Intentional closes (codes 1000 and 1001) stay closed; anything else
//! schedules a retry with attempt-indexed linear delays until the
//! attempt budget is exhausted.
//!
//! # Quick Start
//!
//! ```no_run
//! use chatlink::{Callbacks, ConnectionManager, ManagerConfig, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ManagerConfig::new("wss://chat.example.com/ws")?
//!         .with_max_reconnect_attempts(10);
//!
//!     let callbacks = Callbacks::new()
//!         .with_on_open(|id| println!("connected as {id}"))
//!         .with_on_message(|envelope| println!("received {}", envelope.message_type));
//!
//!     let manager = ConnectionManager::spawn(config, callbacks);
//!     manager.connect().await?;
//!
//!     manager.send_typed("chat", json!({"text": "hello"})).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Manager configuration and event callbacks |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`manager`] | Connection state machine, queue, backoff, heartbeat |
//! | [`protocol`] | Message envelope and close-code helpers |
//! | [`transport`] | WebSocket dialer and transport abstraction |
//!
//! # Guarantees
//!
//! - **Single connection**: at most one live transport per manager
//! - **FIFO delivery**: queued messages flush in order on reconnect
//! - **No silent drops**: sends while offline report `Queued`, not `Ok`
//! - **Race-free**: every transition runs on the owning event loop

// ============================================================================
// Modules
// ============================================================================

/// Manager configuration and event callbacks.
///
/// Use [`ManagerConfig::new`] for a validated endpoint and the
/// `with_*` builders for tuning.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Connection lifecycle management.
///
/// The state machine behind [`ConnectionManager`], plus the queue,
/// backoff policy, and visibility hook.
pub mod manager;

/// Message envelope and close-code helpers.
pub mod protocol;

/// WebSocket transport layer.
///
/// The [`transport::Dialer`] and [`transport::Transport`] seams, with
/// the tokio-tungstenite production implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{Callbacks, ManagerConfig};

// Error types
pub use error::{Error, Result};

// Manager types
pub use manager::{
    ConnectionManager, ConnectionState, OutboundQueue, ReconnectPolicy, SendStatus, Visibility,
    VisibilityMonitor,
};

// Protocol types
pub use protocol::{CLOSE_GOING_AWAY, CLOSE_NORMAL, Envelope, HEARTBEAT_TYPE, is_intentional_close};

//! WebSocket transport layer.
//!
//! This module carries text frames between the connection manager and
//! the streaming backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  ConnectionManager   │        WebSocket        │  Streaming      │
//! │                      │◄───────────────────────►│  Backend        │
//! │  Dialer → Transport  │      wss://host/ws      │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. [`Dialer::dial`] - Open TCP/TLS and complete the WebSocket upgrade
//! 2. [`Transport::send_text`] / [`Transport::next_event`] - Exchange frames
//! 3. [`Transport::close`] - Close with an explicit close code
//!
//! The dialer is injected so tests run against scripted fakes and an
//! authenticated deployment can decorate the upgrade request.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `ws` | Transport seam and `tokio-tungstenite` implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Transport seam and `tokio-tungstenite` implementation.
pub mod ws;

// ============================================================================
// Re-exports
// ============================================================================

pub use ws::{Dialer, Transport, TransportEvent, WsDialer, WsTransport};

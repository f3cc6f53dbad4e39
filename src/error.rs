//! Error types for the connection manager.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chatlink::{ConnectionManager, Result};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     manager.connect().await?;
//!     manager.send_typed("chat", serde_json::json!({"text": "hi"})).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Handshake`], [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Recovery | [`Error::ReconnectExhausted`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |
//!
//! Runtime failures never escape the manager boundary as panics; they are
//! recovered into the observable `error` state field and the caller's
//! error callback. The one fail-fast path is [`Error::Config`] at
//! construction time.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when manager configuration is invalid, e.g. a malformed
    /// endpoint URL or a non-WebSocket scheme. The only error surfaced
    /// at construction time.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket handshake failed.
    ///
    /// Returned when the transport cannot be established at all (DNS,
    /// TCP, TLS, or upgrade failure). Handshake failures are surfaced,
    /// never automatically retried.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Transport-level error on an established connection.
    ///
    /// Recorded into the manager's `error` field; recovery is driven by
    /// the subsequent close event, not by this error itself.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection is closed and the manager has shut down.
    ///
    /// Returned when a command is sent to a manager whose event loop
    /// has already terminated.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Recovery Errors
    // ========================================================================
    /// Automatic reconnection gave up.
    ///
    /// Returned after `max_reconnect_attempts` consecutive abnormal
    /// closes with no successful open in between. Terminal: the caller
    /// must call `connect()` explicitly to resume.
    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a reconnect-exhausted error.
    #[inline]
    pub const fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. }
                | Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is terminal for automatic recovery.
    ///
    /// Terminal errors require an explicit `connect()` call to resume.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::Config { .. } | Self::ConnectionClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

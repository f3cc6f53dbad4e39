//! Connection manager configuration.
//!
//! Provides a type-safe interface for configuring the connection
//! manager: endpoint, sub-protocols, retry and keep-alive cadence, and
//! caller-supplied event callbacks.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use chatlink::ManagerConfig;
//!
//! let config = ManagerConfig::new("wss://chat.example.com/ws")?
//!     .with_protocols(["chat.v1"])
//!     .with_reconnect_interval(Duration::from_secs(3))
//!     .with_max_reconnect_attempts(5)
//!     .with_heartbeat_interval(Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::Envelope;

// ============================================================================
// Constants
// ============================================================================

/// Default base interval for linear reconnect backoff (3s).
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of consecutive reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default keep-alive cadence (30s).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

// ============================================================================
// Callback Types
// ============================================================================

/// Called after each successful open with the fresh connection ID.
pub type OpenHandler = Box<dyn Fn(Uuid) + Send + Sync>;

/// Called for each received envelope, heartbeats included.
pub type MessageHandler = Box<dyn Fn(Envelope) + Send + Sync>;

/// Called when an error is recorded into manager state.
pub type ErrorHandler = Box<dyn Fn(String) + Send + Sync>;

/// Called when the transport closes, with the close code.
pub type CloseHandler = Box<dyn Fn(u16) + Send + Sync>;

// ============================================================================
// ManagerConfig
// ============================================================================

/// Connection manager configuration.
///
/// All knobs are optional with stated defaults; only the endpoint URL is
/// required and validated at construction.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Transport endpoint (`ws://` or `wss://`).
    pub url: Url,

    /// Sub-protocols offered during negotiation.
    pub protocols: Vec<String>,

    /// Base interval for the linear reconnect backoff.
    pub reconnect_interval: Duration,

    /// Consecutive failed reconnects before the manager gives up.
    pub max_reconnect_attempts: u32,

    /// Keep-alive cadence while connected.
    pub heartbeat_interval: Duration,
}

impl ManagerConfig {
    /// Creates a configuration for the given endpoint with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is malformed or its scheme
    /// is not `ws` or `wss`. This is the crate's single fail-fast path.
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| Error::config(format!("invalid endpoint url: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported scheme '{}': expected ws or wss",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            protocols: Vec::new(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        })
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ManagerConfig {
    /// Sets the sub-protocols offered during negotiation.
    #[inline]
    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the base interval for linear reconnect backoff.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the number of consecutive reconnect attempts before giving up.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the keep-alive cadence.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Caller-supplied event callbacks.
///
/// All optional. Callbacks are invoked synchronously from the manager's
/// serialized event handling; re-entrant `connect`/`disconnect` calls
/// from inside a callback are tolerated through command idempotency.
#[derive(Default)]
pub struct Callbacks {
    /// Invoked after each successful open.
    pub on_open: Option<OpenHandler>,

    /// Invoked for each received envelope.
    pub on_message: Option<MessageHandler>,

    /// Invoked when an error is recorded.
    pub on_error: Option<ErrorHandler>,

    /// Invoked when the transport closes.
    pub on_close: Option<CloseHandler>,
}

impl Callbacks {
    /// Creates an empty callback set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open callback.
    #[inline]
    #[must_use]
    pub fn with_on_open(mut self, handler: impl Fn(Uuid) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(handler));
        self
    }

    /// Sets the message callback.
    ///
    /// Heartbeat envelopes are delivered too; filter them with
    /// [`Envelope::is_heartbeat`] if the application does not care.
    #[inline]
    #[must_use]
    pub fn with_on_message(mut self, handler: impl Fn(Envelope) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    /// Sets the error callback.
    #[inline]
    #[must_use]
    pub fn with_on_error(mut self, handler: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Sets the close callback.
    #[inline]
    #[must_use]
    pub fn with_on_close(mut self, handler: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

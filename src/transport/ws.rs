//! WebSocket transport implementation.
//!
//! This module defines the transport seam the connection manager drives:
//! a [`Dialer`] that opens connections and a [`Transport`] carrying text
//! frames in both directions. The production implementation wraps
//! `tokio-tungstenite`; tests inject scripted fakes.
//!
//! The dialer is a constructor-injected dependency so an authenticated
//! opener (e.g. one that attaches session tokens to the upgrade request)
//! can be supplied by the session layer without this crate knowing about
//! credentials.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the stream ends without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported for a close frame carrying no status.
const CLOSE_NO_STATUS: u16 = 1005;

// ============================================================================
// TransportEvent
// ============================================================================

/// An event surfaced by the transport read side.
///
/// A freshly dialed transport emits [`TransportEvent::Opened`] once the
/// connection is live; a connection attempt that dies before opening
/// goes straight to [`TransportEvent::Closed`] with an abnormal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is live and ready to carry frames.
    Opened,

    /// A text frame arrived.
    Text(String),

    /// The transport reported an error without closing.
    Errored(String),

    /// The transport closed with the given close code.
    Closed(u16),
}

// ============================================================================
// Transport Trait
// ============================================================================

/// A live bidirectional text-frame channel.
///
/// Exclusively owned by one connection manager event loop; all methods
/// take `&mut self` and never race each other.
#[async_trait]
pub trait Transport: Send {
    /// Transmits a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the frame cannot be written.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Waits for the next transport event.
    ///
    /// Returns `None` once the transport is finished; after a
    /// [`TransportEvent::Closed`] no further events are produced.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Closes the transport with the given close code.
    ///
    /// Best-effort; errors during close are discarded.
    async fn close(&mut self, code: u16);
}

// ============================================================================
// Dialer Trait
// ============================================================================

/// Opens transports to an endpoint.
///
/// The seam for the session layer: production code uses [`WsDialer`],
/// an authenticated deployment wraps it to decorate the upgrade request,
/// and tests inject scripted fakes.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dials the endpoint and completes the WebSocket handshake.
    ///
    /// # Arguments
    ///
    /// * `url` - Endpoint to connect to (`ws://` or `wss://`)
    /// * `protocols` - Sub-protocols offered during negotiation
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the connection cannot be
    /// established.
    async fn dial(&self, url: &Url, protocols: &[String]) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// WsDialer
// ============================================================================

/// Production dialer backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &Url, protocols: &[String]) -> Result<Box<dyn Transport>> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::handshake(e.to_string()))?;

        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| Error::handshake(format!("invalid sub-protocol list: {e}")))?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::handshake(e.to_string()))?;

        debug!(url = %url, status = %response.status(), "WebSocket handshake completed");

        Ok(Box::new(WsTransport {
            stream,
            opened: false,
        }))
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// A live `tokio-tungstenite` connection.
///
/// The upgrade completes inside [`WsDialer::dial`], so the first read
/// synthesizes [`TransportEvent::Opened`].
pub struct WsTransport {
    /// The underlying WebSocket stream.
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,

    /// Whether the synthetic open event has been delivered.
    opened: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::connection(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if !self.opened {
            self.opened = true;
            return Some(TransportEvent::Opened);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "Text frame received");
                    return Some(TransportEvent::Text(text.to_string()));
                }

                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(CLOSE_NO_STATUS);
                    debug!(code, "Close frame received");
                    return Some(TransportEvent::Closed(code));
                }

                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return Some(TransportEvent::Errored(e.to_string()));
                }

                None => {
                    debug!("WebSocket stream ended without close frame");
                    return Some(TransportEvent::Closed(CLOSE_ABNORMAL));
                }

                // Ignore Binary, Ping, Pong, partial frames
                _ => {}
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };

        if let Err(e) = self.stream.close(Some(frame)).await {
            trace!(error = %e, "Close handshake incomplete");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

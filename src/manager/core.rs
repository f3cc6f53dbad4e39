//! Connection manager and event loop.
//!
//! This module owns the single active connection and drives the state
//! machine: connect, heartbeat, disconnect, scheduled reconnect with
//! linear backoff, and queue-and-flush for messages sent while offline.
//!
//! # Event Loop
//!
//! The manager spawns a tokio task that is the only mutator of
//! [`ConnectionState`]. It reads typed events off its channels:
//!
//! - Commands from the [`ConnectionManager`] handle (connect, disconnect,
//!   reconnect, send)
//! - Dial results from spawned connection attempts, epoch-guarded
//! - Transport events (opened, text frame, error, close)
//! - Heartbeat and reconnect timer fires
//!
//! Serializing every transition through one task means no callback can
//! observe or race a half-applied state change.
//!
//! # Connect Failure Semantics
//!
//! A dial that fails outright (DNS, TCP, TLS, upgrade rejection) is
//! surfaced and never retried automatically; retrying a bad endpoint
//! would mask configuration errors. A connection attempt that dials but
//! closes abnormally before opening feeds the reconnect policy like any
//! other abnormal close.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Sleep, sleep};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::{Callbacks, ManagerConfig};
use crate::error::{Error, Result};
use crate::protocol::{CLOSE_NORMAL, Envelope, is_intentional_close};
use crate::transport::{Dialer, Transport, TransportEvent, WsDialer};

use super::heartbeat::Heartbeat;
use super::queue::OutboundQueue;
use super::reconnect::ReconnectPolicy;
use super::state::{ConnectionState, StateCell};

// ============================================================================
// Constants
// ============================================================================

/// Delay before the connect half of a manual `reconnect()`.
const RECONNECT_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// Close code used when the transport vanishes without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// SendStatus
// ============================================================================

/// Outcome of a send call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Transmitted immediately over the open connection.
    Sent,

    /// No open connection; queued for the next successful open.
    Queued,
}

impl SendStatus {
    /// Returns `true` if the envelope went out immediately.
    #[inline]
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

// ============================================================================
// Command
// ============================================================================

/// Commands from the handle to the event loop.
enum Command {
    /// Ensure a connection attempt is running.
    Connect {
        ack: oneshot::Sender<Result<()>>,
    },
    /// Tear down and go idle.
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    /// Tear down, then connect again after a short fixed delay.
    Reconnect {
        ack: oneshot::Sender<()>,
    },
    /// Transmit now or queue.
    Send {
        envelope: Envelope,
        ack: oneshot::Sender<SendStatus>,
    },
}

// ============================================================================
// Dialed
// ============================================================================

/// Result of a spawned connection attempt.
///
/// Carries the epoch current when the dial started; results from a
/// superseded epoch are dropped, which is what makes `disconnect()` a
/// clean cancellation point for in-flight dials.
struct Dialed {
    epoch: u64,
    result: Result<Box<dyn Transport>>,
}

// ============================================================================
// LoopEvent
// ============================================================================

/// A single unit of work for the event loop.
enum LoopEvent {
    Command(Command),
    Dialed(Dialed),
    HeartbeatTick,
    ReconnectFired,
    Transport(TransportEvent),
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Handle to a running connection manager.
///
/// Cheap to clone; all clones drive the same connection. Dropping every
/// handle shuts the event loop down, closing the transport and
/// cancelling both timers.
///
/// # Thread Safety
///
/// `ConnectionManager` is `Send + Sync`. Commands are serialized through
/// the event loop; queries read a shared snapshot without blocking.
pub struct ConnectionManager {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<Command>,
    /// Observable state (shared with the event loop).
    state: StateCell,
}

impl Clone for ConnectionManager {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }
}

impl ConnectionManager {
    /// Spawns a manager using the production WebSocket dialer.
    #[must_use]
    pub fn spawn(config: ManagerConfig, callbacks: Callbacks) -> Self {
        Self::spawn_with_dialer(config, callbacks, WsDialer)
    }

    /// Spawns a manager with an injected dialer.
    ///
    /// The seam for authenticated transport openers and for tests.
    #[must_use]
    pub fn spawn_with_dialer(
        config: ManagerConfig,
        callbacks: Callbacks,
        dialer: impl Dialer + 'static,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (dial_tx, dial_rx) = mpsc::unbounded_channel();
        let state = StateCell::new();

        let policy = ReconnectPolicy::new(config.reconnect_interval, config.max_reconnect_attempts);

        let event_loop = EventLoop {
            config,
            callbacks,
            dialer: Arc::new(dialer),
            policy,
            state: state.clone(),
            command_rx,
            dial_tx,
            dial_rx,
            transport: None,
            queue: OutboundQueue::new(),
            heartbeat: Heartbeat::new(),
            reconnect_timer: None,
            epoch: 0,
            pending_connects: Vec::new(),
        };

        tokio::spawn(event_loop.run());

        Self { command_tx, state }
    }

    /// Ensures a connection attempt is running.
    ///
    /// Idempotent: a no-op returning `Ok` when already connected, and a
    /// join onto the in-flight attempt when already connecting. A fresh
    /// attempt resolves once the connection opens or the dial fails.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if the transport cannot be established;
    ///   handshake failures are surfaced, never retried automatically
    /// - [`Error::Connection`] if the attempt closed before opening
    /// - [`Error::ConnectionClosed`] if the manager has shut down
    pub async fn connect(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Connect { ack })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Tears the connection down and goes idle.
    ///
    /// Cancels any scheduled reconnect, stops the heartbeat, closes the
    /// transport with a normal-closure code, and resets the state to its
    /// idle defaults. Idempotent. No automatic reconnection happens
    /// until [`connect`](Self::connect) is called again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the manager has shut down.
    pub async fn disconnect(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Disconnect { ack })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Forces a fresh connection: disconnect now, connect after a fixed
    /// one-second delay.
    ///
    /// Independent of the automatic backoff policy; meant for manual
    /// "refresh" actions by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the manager has shut down.
    pub async fn reconnect(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Reconnect { ack })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Transmits an envelope now, or queues it while disconnected.
    ///
    /// Never blocks on the network state: returns [`SendStatus::Sent`]
    /// after an immediate transmit, [`SendStatus::Queued`] otherwise.
    /// Queued envelopes flush in FIFO order on the next successful open;
    /// queue depth is observable via [`queue_depth`](Self::queue_depth).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the manager has shut down.
    pub async fn send(&self, envelope: Envelope) -> Result<SendStatus> {
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send { envelope, ack })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Convenience: stamps the current time and sends a typed envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the manager has shut down.
    pub async fn send_typed(
        &self,
        message_type: impl Into<String>,
        data: Value,
    ) -> Result<SendStatus> {
        self.send(Envelope::typed(message_type, data)).await
    }
}

// ============================================================================
// ConnectionManager Queries
// ============================================================================

impl ConnectionManager {
    /// Returns a snapshot of the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.snapshot()
    }

    /// Returns `true` while a connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.snapshot().connected
    }

    /// Returns `true` while a connection attempt is in flight.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state.snapshot().connecting
    }

    /// Returns the identity of the current connection, if open.
    ///
    /// Fresh per successful open; `None` whenever disconnected. Callers
    /// use it to detect identity changes across reconnects.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> Option<Uuid> {
        self.state.snapshot().connection_id
    }

    /// Returns the retries scheduled since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.snapshot().reconnect_attempts
    }

    /// Returns the last recorded error, if any.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.snapshot().error
    }

    /// Returns the most recently received envelope.
    #[inline]
    #[must_use]
    pub fn last_message(&self) -> Option<Envelope> {
        self.state.snapshot().last_message
    }

    /// Returns the outbound queue depth.
    #[inline]
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.state.queue_depth()
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// The owning task behind a [`ConnectionManager`].
struct EventLoop {
    config: ManagerConfig,
    callbacks: Callbacks,
    dialer: Arc<dyn Dialer>,
    policy: ReconnectPolicy,
    state: StateCell,
    command_rx: mpsc::UnboundedReceiver<Command>,
    dial_tx: mpsc::UnboundedSender<Dialed>,
    dial_rx: mpsc::UnboundedReceiver<Dialed>,
    transport: Option<Box<dyn Transport>>,
    queue: OutboundQueue,
    heartbeat: Heartbeat,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    /// Bumped by `disconnect()`; dial results from older epochs are stale.
    epoch: u64,
    /// Connect calls awaiting the in-flight attempt.
    pending_connects: Vec<oneshot::Sender<Result<()>>>,
}

impl EventLoop {
    /// Runs until every handle is dropped.
    async fn run(mut self) {
        debug!(url = %self.config.url, "Connection manager started");

        loop {
            let event = tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => LoopEvent::Command(command),
                    None => break,
                },

                dialed = self.dial_rx.recv() => match dialed {
                    Some(dialed) => LoopEvent::Dialed(dialed),
                    None => break,
                },

                () = self.heartbeat.tick() => LoopEvent::HeartbeatTick,

                () = fire_reconnect(&mut self.reconnect_timer) => LoopEvent::ReconnectFired,

                event = next_transport_event(&mut self.transport) => LoopEvent::Transport(event),
            };

            match event {
                LoopEvent::Command(Command::Connect { ack }) => self.handle_connect(ack),

                LoopEvent::Command(Command::Disconnect { ack }) => {
                    self.do_disconnect().await;
                    let _ = ack.send(());
                }

                LoopEvent::Command(Command::Reconnect { ack }) => {
                    self.do_disconnect().await;
                    self.reconnect_timer = Some(Box::pin(sleep(RECONNECT_REFRESH_DELAY)));
                    debug!(
                        delay_ms = RECONNECT_REFRESH_DELAY.as_millis() as u64,
                        "Manual reconnect scheduled"
                    );
                    let _ = ack.send(());
                }

                LoopEvent::Command(Command::Send { envelope, ack }) => {
                    let status = self.handle_send(envelope).await;
                    let _ = ack.send(status);
                }

                LoopEvent::Dialed(dialed) => self.handle_dialed(dialed),

                LoopEvent::HeartbeatTick => self.handle_heartbeat_tick().await,

                LoopEvent::ReconnectFired => {
                    self.reconnect_timer = None;
                    debug!("Reconnect timer fired");
                    self.begin_connect();
                }

                LoopEvent::Transport(event) => self.handle_transport_event(event).await,
            }
        }

        // All handles gone: tear down timers and transport.
        self.do_disconnect().await;
        debug!("Connection manager event loop terminated");
    }

    /// Handles an explicit connect command.
    fn handle_connect(&mut self, ack: oneshot::Sender<Result<()>>) {
        let snapshot = self.state.snapshot();

        if snapshot.connected {
            let _ = ack.send(Ok(()));
            return;
        }

        // Join the in-flight attempt rather than starting a second one.
        self.pending_connects.push(ack);
        if !snapshot.connecting {
            self.begin_connect();
        }
    }

    /// Starts a connection attempt unless one is live or in flight.
    fn begin_connect(&mut self) {
        let snapshot = self.state.snapshot();
        if snapshot.connected || snapshot.connecting {
            return;
        }

        self.state.update(|state| {
            state.connecting = true;
            state.error = None;
        });

        let epoch = self.epoch;
        let dialer = Arc::clone(&self.dialer);
        let url = self.config.url.clone();
        let protocols = self.config.protocols.clone();
        let dial_tx = self.dial_tx.clone();

        debug!(url = %url, epoch, "Dialing");
        tokio::spawn(async move {
            let result = dialer.dial(&url, &protocols).await;
            let _ = dial_tx.send(Dialed { epoch, result });
        });
    }

    /// Applies a dial result, dropping stale epochs.
    fn handle_dialed(&mut self, dialed: Dialed) {
        if dialed.epoch != self.epoch {
            debug!(
                stale = dialed.epoch,
                current = self.epoch,
                "Dropping dial result from superseded attempt"
            );
            return;
        }

        match dialed.result {
            Ok(transport) => {
                // Established but not yet open; the transport's Opened
                // event completes the transition.
                self.transport = Some(transport);
            }

            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Handshake failed");

                self.state.update(|state| {
                    state.connecting = false;
                    state.error = Some(message.clone());
                });
                self.invoke_on_error(&message);

                // Surfaced, not retried: a bad endpoint must not turn
                // into a retry storm.
                self.fail_pending_connects(|| Error::handshake(message.clone()));
            }
        }
    }

    /// Handles one transport event.
    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_opened().await,

            TransportEvent::Text(text) => self.handle_text(&text),

            TransportEvent::Errored(message) => {
                // Recorded only; recovery is driven solely by the close
                // event so a failure cannot double-schedule a retry.
                warn!(error = %message, "Transport error");
                self.state.update(|state| state.error = Some(message.clone()));
                self.invoke_on_error(&message);
            }

            TransportEvent::Closed(code) => self.handle_closed(code).await,
        }
    }

    /// Completes a successful open.
    async fn handle_opened(&mut self) {
        let connection_id = Uuid::new_v4();

        self.state.update(|state| {
            state.connected = true;
            state.connecting = false;
            state.reconnect_attempts = 0;
            state.connection_id = Some(connection_id);
        });
        info!(%connection_id, "Connection open");

        // Flush before yielding to any other event, so nothing can jump
        // ahead of envelopes queued while offline.
        self.flush_queue().await;

        self.heartbeat.start(self.config.heartbeat_interval);

        if let Some(on_open) = &self.callbacks.on_open {
            on_open(connection_id);
        }
        self.resolve_pending_connects();
    }

    /// Parses and surfaces an incoming frame.
    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                trace!(message_type = %envelope.message_type, "Envelope received");
                self.state
                    .update(|state| state.last_message = Some(envelope.clone()));

                if let Some(on_message) = &self.callbacks.on_message {
                    on_message(envelope);
                }
            }

            Err(e) => {
                // Malformed frames are dropped, never propagated.
                warn!(error = %e, "Failed to parse incoming envelope");
            }
        }
    }

    /// Handles a transport close with the given code.
    async fn handle_closed(&mut self, code: u16) {
        self.transport = None;
        self.heartbeat.stop();

        self.state.update(|state| {
            state.connected = false;
            state.connecting = false;
            state.connection_id = None;
        });
        debug!(code, "Transport closed");

        if let Some(on_close) = &self.callbacks.on_close {
            on_close(code);
        }

        self.fail_pending_connects(|| {
            Error::connection(format!("connection closed before open (code {code})"))
        });

        if is_intentional_close(code) {
            debug!(code, "Intentional close; not reconnecting");
            return;
        }

        self.schedule_reconnect();
    }

    /// Arms the next retry, or surfaces exhaustion.
    fn schedule_reconnect(&mut self) {
        let attempts = self.state.snapshot().reconnect_attempts;

        match self.policy.schedule(attempts) {
            Some(schedule) => {
                // Recorded before the timer fires so a racing close
                // cannot double-schedule against a stale count.
                self.state
                    .update(|state| state.reconnect_attempts = schedule.attempt);

                debug!(
                    attempt = schedule.attempt,
                    delay_ms = schedule.delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                self.reconnect_timer = Some(Box::pin(sleep(schedule.delay)));
            }

            None => {
                let message = Error::reconnect_exhausted(attempts).to_string();
                error!(attempts, "Giving up on automatic reconnection");

                self.state.update(|state| state.error = Some(message.clone()));
                self.invoke_on_error(&message);
            }
        }
    }

    /// Transmits now or queues.
    async fn handle_send(&mut self, envelope: Envelope) -> SendStatus {
        if self.state.snapshot().connected
            && let Some(transport) = self.transport.as_mut()
        {
            match serde_json::to_string(&envelope) {
                Ok(text) => match transport.send_text(text).await {
                    Ok(()) => {
                        trace!(message_type = %envelope.message_type, "Envelope sent");
                        return SendStatus::Sent;
                    }

                    Err(e) => {
                        // Failed sends are queued, not lost.
                        let message = e.to_string();
                        warn!(error = %message, "Send failed; envelope queued");
                        self.state.update(|state| state.error = Some(message.clone()));
                        self.invoke_on_error(&message);
                    }
                },

                Err(e) => {
                    warn!(error = %e, "Envelope serialization failed; queued");
                }
            }
        }

        self.queue.enqueue(envelope);
        self.state.set_queue_depth(self.queue.len());
        trace!(depth = self.queue.len(), "Envelope queued");
        SendStatus::Queued
    }

    /// Sends a heartbeat if the connection is open; otherwise a no-op.
    async fn handle_heartbeat_tick(&mut self) {
        if !self.state.snapshot().connected {
            return;
        }
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let envelope = Envelope::heartbeat();
        match serde_json::to_string(&envelope) {
            Ok(text) => {
                if let Err(e) = transport.send_text(text).await {
                    let message = e.to_string();
                    warn!(error = %message, "Heartbeat send failed");
                    self.state.update(|state| state.error = Some(message.clone()));
                    self.invoke_on_error(&message);
                } else {
                    trace!("Heartbeat sent");
                }
            }

            Err(e) => warn!(error = %e, "Heartbeat serialization failed"),
        }
    }

    /// The single cancellation point: timers, in-flight dials, transport.
    async fn do_disconnect(&mut self) {
        self.epoch += 1;
        self.reconnect_timer = None;
        self.heartbeat.stop();

        if let Some(mut transport) = self.transport.take() {
            transport.close(CLOSE_NORMAL).await;
        }

        self.fail_pending_connects(|| Error::ConnectionClosed);

        self.state.update(|state| {
            state.connected = false;
            state.connecting = false;
            state.reconnect_attempts = 0;
            state.connection_id = None;
            state.error = None;
        });

        debug!("Disconnected");
    }

    /// Drains queued envelopes over the fresh transport, in order.
    async fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let sent = self
            .queue
            .flush(async |envelope| {
                let text = serde_json::to_string(&envelope)?;
                transport.send_text(text).await
            })
            .await;

        let remaining = self.queue.len();
        self.state.set_queue_depth(remaining);

        if remaining > 0 {
            warn!(sent, remaining, "Queue flush stopped on send failure");
        } else {
            debug!(sent, "Outbound queue flushed");
        }
    }

    /// Resolves every pending connect call with success.
    fn resolve_pending_connects(&mut self) {
        for ack in self.pending_connects.drain(..) {
            let _ = ack.send(Ok(()));
        }
    }

    /// Fails every pending connect call.
    fn fail_pending_connects(&mut self, mut make_error: impl FnMut() -> Error) {
        for ack in self.pending_connects.drain(..) {
            let _ = ack.send(Err(make_error()));
        }
    }

    /// Invokes the caller's error callback, if registered.
    fn invoke_on_error(&self, message: &str) {
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(message.to_string());
        }
    }
}

// ============================================================================
// Select Helpers
// ============================================================================

/// Completes when the armed reconnect timer fires; never while disarmed.
async fn fire_reconnect(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

/// Yields the next transport event; never completes without a transport.
///
/// A stream that ends without a close frame counts as an abnormal close.
async fn next_transport_event(transport: &mut Option<Box<dyn Transport>>) -> TransportEvent {
    match transport.as_mut() {
        Some(transport) => transport
            .next_event()
            .await
            .unwrap_or(TransportEvent::Closed(CLOSE_ABNORMAL)),
        None => pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::timeout;

    use crate::manager::support::{ScriptedDialer, init_tracing};

    /// Builds a manager over a scripted dialer with tight test timings.
    fn manager_with(
        dialer: &Arc<ScriptedDialer>,
        callbacks: Callbacks,
        max_attempts: u32,
    ) -> ConnectionManager {
        init_tracing();
        let config = ManagerConfig::new("ws://test.invalid/ws")
            .expect("valid config")
            .with_reconnect_interval(Duration::from_millis(100))
            .with_max_reconnect_attempts(max_attempts)
            .with_heartbeat_interval(Duration::from_secs(1));

        ConnectionManager::spawn_with_dialer(config, callbacks, Arc::clone(dialer))
    }

    /// Polls until `check` passes; panics after five (virtual) seconds.
    async fn wait_for(check: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !check() {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resolves_on_open() {
        let dialer = Arc::new(ScriptedDialer::default());
        let _wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        manager.connect().await.expect("connect should succeed");

        assert!(manager.is_connected());
        assert!(!manager.is_connecting());
        assert!(manager.connection_id().is_some());
        assert_eq!(manager.reconnect_attempts(), 0);
        assert_eq!(dialer.dial_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let dialer = Arc::new(ScriptedDialer::default());
        let _wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        manager.connect().await.expect("first connect");
        manager.connect().await.expect("second connect is a no-op");

        assert_eq!(dialer.dial_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_failure_is_not_retried() {
        // Current behavior: a dial that fails outright (DNS/TLS/refused)
        // is surfaced and does not self-heal; only abnormal closes do.
        let dialer = Arc::new(ScriptedDialer::default());
        dialer.script_fail("dns lookup failed");

        let errors: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&errors);
        let callbacks = Callbacks::new().with_on_error(move |m| sink.lock().push(m));

        let manager = manager_with(&dialer, callbacks, 5);

        let result = manager.connect().await;
        assert!(matches!(result, Err(Error::Handshake { .. })));
        assert!(manager.error().expect("error recorded").contains("dns"));
        assert_eq!(errors.lock().len(), 1);

        // No retry timer was armed.
        sleep(Duration::from_secs(60)).await;
        assert_eq!(dialer.dial_count(), 1);
        assert_eq!(manager.reconnect_attempts(), 0);
        assert!(manager.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_connected() {
        let dialer = Arc::new(ScriptedDialer::default());
        let mut wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");

        let status = manager
            .send_typed("chat", json!({"text": "hello"}))
            .await
            .expect("send");
        assert!(status.is_sent());

        let envelope = wires.next_sent().await;
        assert_eq!(envelope.message_type, "chat");
        assert_eq!(envelope.data, json!({"text": "hello"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_queues() {
        let dialer = Arc::new(ScriptedDialer::default());
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        let status = manager
            .send_typed("chat", json!({"seq": 1}))
            .await
            .expect("send");

        assert_eq!(status, SendStatus::Queued);
        assert_eq!(manager.queue_depth(), 1);
        assert!(manager.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_flushes_in_order_before_heartbeat() {
        let dialer = Arc::new(ScriptedDialer::default());
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        manager
            .send_typed("chat", json!({"seq": 1}))
            .await
            .expect("send");
        manager
            .send_typed("chat", json!({"seq": 2}))
            .await
            .expect("send");
        assert_eq!(manager.queue_depth(), 2);

        let mut wires = dialer.script_open();
        manager.connect().await.expect("connect");

        let first = wires.next_sent().await;
        let second = wires.next_sent().await;
        assert_eq!(first.data, json!({"seq": 1}));
        assert_eq!(second.data, json!({"seq": 2}));
        assert_eq!(manager.queue_depth(), 0);

        // Next frame on the wire is the first heartbeat, one interval in.
        let third = wires.next_sent().await;
        assert!(third.is_heartbeat());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_flush_keeps_remainder() {
        let dialer = Arc::new(ScriptedDialer::default());
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        for seq in 1..=3 {
            manager
                .send_typed("chat", json!({"seq": seq}))
                .await
                .expect("send");
        }

        let wires = dialer.script_open();
        wires.fail_sends.store(true, Ordering::SeqCst);
        manager.connect().await.expect("connect");

        // Nothing drained; all three still queued, in order.
        wait_for(|| manager.queue_depth() == 3).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence_and_silence_after_disconnect() {
        let dialer = Arc::new(ScriptedDialer::default());
        let mut wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");

        // Two intervals, two heartbeats.
        let first = wires.next_sent().await;
        let second = wires.next_sent().await;
        assert!(first.is_heartbeat());
        assert!(second.is_heartbeat());

        manager.disconnect().await.expect("disconnect");
        assert_eq!(wires.next_close().await, 1000);

        // Mid-interval disconnect: nothing further, ever.
        let silence = timeout(Duration::from_secs(30), wires.sent.recv()).await;
        assert!(silence.is_err() || silence.expect("channel").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_envelope_updates_last_message() {
        let dialer = Arc::new(ScriptedDialer::default());
        let wires = dialer.script_open();

        let received: Arc<Mutex<Vec<Envelope>>> = Arc::default();
        let sink = Arc::clone(&received);
        let callbacks = Callbacks::new().with_on_message(move |e| sink.lock().push(e));

        let manager = manager_with(&dialer, callbacks, 5);
        manager.connect().await.expect("connect");

        wires.text(r#"{"type":"chat","data":{"text":"hi"},"timestamp":42}"#);
        wait_for(|| manager.last_message().is_some()).await;

        let last = manager.last_message().expect("last message");
        assert_eq!(last.message_type, "chat");
        assert_eq!(last.timestamp, 42);
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_envelope_dropped() {
        let dialer = Arc::new(ScriptedDialer::default());
        let wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");

        wires.text("not json at all");
        wires.text(r#"{"type":"chat","data":{},"timestamp":7}"#);

        // The garbage frame is skipped; the next valid one lands.
        wait_for(|| manager.last_message().is_some()).await;
        assert_eq!(manager.last_message().expect("message").timestamp, 7);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_records_without_closing() {
        let dialer = Arc::new(ScriptedDialer::default());
        let wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");

        wires.errored("tcp reset");
        wait_for(|| manager.error().is_some()).await;

        // Still connected; only the close event drives recovery.
        assert!(manager.is_connected());
        assert_eq!(dialer.dial_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_close_never_reconnects() {
        let dialer = Arc::new(ScriptedDialer::default());
        let wires = dialer.script_open();

        let closes: Arc<Mutex<Vec<u16>>> = Arc::default();
        let sink = Arc::clone(&closes);
        let callbacks = Callbacks::new().with_on_close(move |c| sink.lock().push(c));

        let manager = manager_with(&dialer, callbacks, 5);
        manager.connect().await.expect("connect");

        wires.close(1000);
        wait_for(|| !manager.is_connected()).await;

        sleep(Duration::from_secs(60)).await;
        assert_eq!(dialer.dial_count(), 1);
        assert_eq!(closes.lock().as_slice(), &[1000]);
        assert!(manager.connection_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_schedules_exactly_one_retry() {
        let dialer = Arc::new(ScriptedDialer::default());
        let wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");
        let first_id = manager.connection_id().expect("id");

        let _second = dialer.script_open();
        wires.close(1006);

        wait_for(|| !manager.is_connected()).await;
        assert_eq!(manager.reconnect_attempts(), 1);

        wait_for(|| manager.is_connected()).await;
        assert_eq!(dialer.dial_count(), 2);
        assert_eq!(manager.reconnect_attempts(), 0);

        // Fresh identity per open.
        let second_id = manager.connection_id().expect("id");
        assert_ne!(first_id, second_id);

        // No stray extra retry.
        sleep(Duration::from_secs(60)).await;
        assert_eq!(dialer.dial_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_ladder_and_exhaustion() {
        // maxReconnectAttempts=3, base=100ms: expect retry delays of
        // 100ms, 200ms, 300ms, then a terminal exhausted error and no
        // further dial.
        let dialer = Arc::new(ScriptedDialer::default());
        for _ in 0..4 {
            dialer.script_dead(1006);
        }

        let manager = manager_with(&dialer, Callbacks::new(), 3);

        let result = manager.connect().await;
        assert!(matches!(result, Err(Error::Connection { .. })));

        wait_for(|| {
            manager
                .error()
                .is_some_and(|e| e.contains("exhausted"))
        })
        .await;

        assert_eq!(dialer.dial_count(), 4);
        assert_eq!(manager.reconnect_attempts(), 3);

        let times = dialer.dial_times();
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![100, 200, 300]);

        // No fourth timer.
        sleep(Duration::from_secs(60)).await;
        assert_eq!(dialer.dial_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resumes_after_exhaustion() {
        let dialer = Arc::new(ScriptedDialer::default());
        dialer.script_dead(1006);
        dialer.script_dead(1006);

        let manager = manager_with(&dialer, Callbacks::new(), 1);
        let _ = manager.connect().await;

        wait_for(|| {
            manager
                .error()
                .is_some_and(|e| e.contains("exhausted"))
        })
        .await;

        // An explicit connect starts over and clears the error.
        let _wires = dialer.script_open();
        manager.connect().await.expect("manual connect resumes");
        assert!(manager.is_connected());
        assert!(manager.error().is_none());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let dialer = Arc::new(ScriptedDialer::default());
        let mut wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");

        manager.disconnect().await.expect("first disconnect");
        manager.disconnect().await.expect("second disconnect");

        let state = manager.state();
        assert!(state.is_idle());
        assert!(state.connection_id.is_none());
        assert!(state.error.is_none());
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(wires.next_close().await, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_scheduled_retry() {
        let dialer = Arc::new(ScriptedDialer::default());
        let wires = dialer.script_open();
        let manager = manager_with(&dialer, Callbacks::new(), 5);
        manager.connect().await.expect("connect");

        wires.close(1006);
        wait_for(|| manager.reconnect_attempts() == 1).await;

        manager.disconnect().await.expect("disconnect");

        sleep(Duration::from_secs(60)).await;
        assert_eq!(dialer.dial_count(), 1);
        assert!(manager.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_aborts_in_flight_dial() {
        let dialer = Arc::new(ScriptedDialer::default());
        dialer.script_slow(Duration::from_secs(5));
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect().await })
        };
        wait_for(|| manager.is_connecting()).await;

        manager.disconnect().await.expect("disconnect");

        let result = pending.await.expect("task");
        assert!(matches!(result, Err(Error::ConnectionClosed)));

        // The stale dial result lands and is dropped by the epoch guard.
        sleep(Duration::from_secs(10)).await;
        assert!(manager.state().is_idle());
        assert!(manager.connection_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_survives_manual_disconnect() {
        let dialer = Arc::new(ScriptedDialer::default());
        let manager = manager_with(&dialer, Callbacks::new(), 5);

        manager
            .send_typed("chat", json!({"seq": 1}))
            .await
            .expect("send");
        manager.disconnect().await.expect("disconnect");
        assert_eq!(manager.queue_depth(), 1);

        let mut wires = dialer.script_open();
        manager.connect().await.expect("connect");

        let envelope = wires.next_sent().await;
        assert_eq!(envelope.data, json!({"seq": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_cycles_connection() {
        let dialer = Arc::new(ScriptedDialer::default());
        let mut wires = dialer.script_open();

        let opens: Arc<Mutex<Vec<Uuid>>> = Arc::default();
        let sink = Arc::clone(&opens);
        let callbacks = Callbacks::new().with_on_open(move |id| sink.lock().push(id));

        let manager = manager_with(&dialer, callbacks, 5);
        manager.connect().await.expect("connect");

        let _second = dialer.script_open();
        manager.reconnect().await.expect("reconnect");

        // Old transport closed normally, fresh dial one second later.
        assert_eq!(wires.next_close().await, 1000);
        wait_for(|| manager.is_connected()).await;
        assert_eq!(dialer.dial_count(), 2);

        let times = dialer.dial_times();
        assert_eq!((times[1] - times[0]).as_millis(), 1000);

        let opens = opens.lock();
        assert_eq!(opens.len(), 2);
        assert_ne!(opens[0], opens[1]);
    }
}

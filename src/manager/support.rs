//! Scripted transport fakes shared by the manager tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::{Dialer, Transport, TransportEvent};

/// Installs the test tracing subscriber once; honors `RUST_LOG`.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test-side handles into one scripted connection.
pub(crate) struct Wires {
    events: mpsc::UnboundedSender<TransportEvent>,
    pub(crate) sent: mpsc::UnboundedReceiver<String>,
    closes: mpsc::UnboundedReceiver<u16>,
    pub(crate) fail_sends: Arc<AtomicBool>,
}

impl Wires {
    /// Pushes a text frame onto the connection.
    pub(crate) fn text(&self, raw: &str) {
        self.events
            .send(TransportEvent::Text(raw.to_owned()))
            .expect("transport gone");
    }

    /// Pushes a transport error.
    pub(crate) fn errored(&self, message: &str) {
        self.events
            .send(TransportEvent::Errored(message.to_owned()))
            .expect("transport gone");
    }

    /// Closes the connection with the given code.
    pub(crate) fn close(&self, code: u16) {
        let _ = self.events.send(TransportEvent::Closed(code));
    }

    /// Awaits the next outbound frame and parses it.
    pub(crate) async fn next_sent(&mut self) -> Envelope {
        let raw = timeout(Duration::from_secs(30), self.sent.recv())
            .await
            .expect("no frame sent in time")
            .expect("transport gone");
        serde_json::from_str(&raw).expect("outbound frame is a valid envelope")
    }

    /// Awaits the close code the manager sent.
    pub(crate) async fn next_close(&mut self) -> u16 {
        timeout(Duration::from_secs(30), self.closes.recv())
            .await
            .expect("no close in time")
            .expect("transport gone")
    }
}

/// Transport half driven by a [`Wires`] script.
struct ScriptedTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sent: mpsc::UnboundedSender<String>,
    closes: mpsc::UnboundedSender<u16>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::connection("scripted send failure"));
        }
        let _ = self.sent.send(text);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn close(&mut self, code: u16) {
        let _ = self.closes.send(code);
    }
}

/// One pre-arranged dial outcome.
enum DialScript {
    Ok(Box<dyn Transport>),
    Slow(Duration, Box<dyn Transport>),
    Fail(String),
}

/// Dialer that hands out pre-scripted connections in order.
///
/// Every dial consumes the next script; an unscripted dial fails as a
/// handshake error. Dial timestamps are recorded for backoff assertions.
#[derive(Default)]
pub(crate) struct ScriptedDialer {
    scripts: Mutex<VecDeque<DialScript>>,
    dials: AtomicUsize,
    dial_times: Mutex<Vec<Instant>>,
}

impl ScriptedDialer {
    fn script_transport(&self) -> (Wires, Box<dyn Transport>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (closes_tx, closes_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));

        let wires = Wires {
            events: events_tx,
            sent: sent_rx,
            closes: closes_rx,
            fail_sends: Arc::clone(&fail_sends),
        };
        let transport = Box::new(ScriptedTransport {
            events: events_rx,
            sent: sent_tx,
            closes: closes_tx,
            fail_sends,
        });
        (wires, transport)
    }

    /// Scripts a dial that succeeds and opens immediately.
    pub(crate) fn script_open(&self) -> Wires {
        let (wires, transport) = self.script_transport();
        wires
            .events
            .send(TransportEvent::Opened)
            .expect("fresh channel");
        self.scripts.lock().push_back(DialScript::Ok(transport));
        wires
    }

    /// Scripts a dial that succeeds but closes before opening.
    pub(crate) fn script_dead(&self, code: u16) {
        let (wires, transport) = self.script_transport();
        wires
            .events
            .send(TransportEvent::Closed(code))
            .expect("fresh channel");
        self.scripts.lock().push_back(DialScript::Ok(transport));
    }

    /// Scripts a dial that fails outright.
    pub(crate) fn script_fail(&self, message: &str) {
        self.scripts
            .lock()
            .push_back(DialScript::Fail(message.to_owned()));
    }

    /// Scripts a dial that opens only after `delay`.
    pub(crate) fn script_slow(&self, delay: Duration) -> Wires {
        let (wires, transport) = self.script_transport();
        wires
            .events
            .send(TransportEvent::Opened)
            .expect("fresh channel");
        self.scripts
            .lock()
            .push_back(DialScript::Slow(delay, transport));
        wires
    }

    /// Number of dial calls so far.
    pub(crate) fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Timestamps of every dial call, in order.
    pub(crate) fn dial_times(&self) -> Vec<Instant> {
        self.dial_times.lock().clone()
    }
}

#[async_trait]
impl Dialer for Arc<ScriptedDialer> {
    async fn dial(&self, _url: &Url, _protocols: &[String]) -> Result<Box<dyn Transport>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.dial_times.lock().push(Instant::now());

        let script = self.scripts.lock().pop_front();
        match script {
            Some(DialScript::Ok(transport)) => Ok(transport),
            Some(DialScript::Slow(delay, transport)) => {
                sleep(delay).await;
                Ok(transport)
            }
            Some(DialScript::Fail(message)) => Err(Error::handshake(message)),
            None => Err(Error::handshake("no scripted connection available")),
        }
    }
}

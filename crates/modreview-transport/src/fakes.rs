//! In-memory fakes for the channel traits (testing only)
//!
//! `MemoryConnector` hands out `MemoryChannel`s and gives the test a
//! matching `ChannelProbe` for each one, through which it can inject inbound
//! frames, fail or close the connection, and inspect what was sent and how
//! often `close` was called.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::channel_traits::{Channel, ChannelEvent, Connector};
use crate::error::TransportError;
use crate::TransportResult;

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// What the connector does with the next `open` call.
enum OpenPlan {
    Fail(TransportError),
    Hold(oneshot::Receiver<()>),
}

/// Recorded arguments of one `open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAttempt {
    pub endpoint: String,
    pub credential: String,
}

/// Releases a held `open` call.
pub struct OpenGate {
    tx: oneshot::Sender<()>,
}

impl OpenGate {
    /// Let the held `open` complete successfully.
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

/// In-memory connector. Every `open` succeeds unless a plan says otherwise.
pub struct MemoryConnector {
    plans: Mutex<VecDeque<OpenPlan>>,
    attempts: Mutex<Vec<OpenAttempt>>,
    probes_tx: mpsc::UnboundedSender<ChannelProbe>,
    probes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelProbe>>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        let (probes_tx, probes_rx) = mpsc::unbounded_channel();
        Self {
            plans: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            probes_tx,
            probes_rx: tokio::sync::Mutex::new(probes_rx),
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.plans.lock().unwrap().push_back(OpenPlan::Fail(error));
    }

    /// Make the next `open` block until the returned gate is released.
    pub fn hold_next(&self) -> OpenGate {
        let (tx, rx) = oneshot::channel();
        self.plans.lock().unwrap().push_back(OpenPlan::Hold(rx));
        OpenGate { tx }
    }

    /// Every `open` call seen so far, including failed ones.
    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    /// Wait for the next successfully opened channel.
    pub async fn next_channel(&self) -> ChannelProbe {
        self.probes_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped its probe sender")
    }

    /// Channels opened and not yet closed.
    pub fn live_channels(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open channels observed.
    pub fn peak_channels(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &str, credential: &str) -> TransportResult<Box<dyn Channel>> {
        self.attempts.lock().unwrap().push(OpenAttempt {
            endpoint: endpoint.to_string(),
            credential: credential.to_string(),
        });

        let plan = self.plans.lock().unwrap().pop_front();
        match plan {
            Some(OpenPlan::Fail(err)) => return Err(err),
            Some(OpenPlan::Hold(rx)) => {
                let _ = rx.await;
            }
            None => {}
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ProbeState::default()));
        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_live, Ordering::SeqCst);

        let _ = self.probes_tx.send(ChannelProbe {
            inbound: tx,
            state: Arc::clone(&state),
        });

        Ok(Box::new(MemoryChannel {
            inbound: rx,
            state,
            live: Arc::clone(&self.live),
            terminated: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// MemoryChannel / ChannelProbe
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ProbeState {
    sent: Vec<Value>,
    close_calls: usize,
    closed: bool,
}

/// Channel side of a fake connection.
pub struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    state: Arc<Mutex<ProbeState>>,
    live: Arc<AtomicUsize>,
    terminated: bool,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, message: &Value) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(TransportError::NotOpen);
        }
        state.sent.push(message.clone());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.terminated {
            return None;
        }
        let event = self.inbound.recv().await?;
        if event.is_terminal() {
            self.terminated = true;
        }
        Some(event)
    }

    async fn close(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        if !state.closed {
            state.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().unwrap().closed
    }
}

/// Test side of a fake connection.
#[derive(Clone)]
pub struct ChannelProbe {
    inbound: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<Mutex<ProbeState>>,
}

impl ChannelProbe {
    /// Deliver one inbound text frame.
    pub fn deliver(&self, text: impl Into<String>) {
        let _ = self.inbound.send(ChannelEvent::Message(text.into()));
    }

    /// Deliver one inbound JSON frame.
    pub fn deliver_json(&self, value: Value) {
        self.deliver(value.to_string());
    }

    /// Simulate a transport failure.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.inbound.send(ChannelEvent::Error(reason.into()));
    }

    /// Simulate the peer closing the connection.
    pub fn close_remote(&self) {
        let _ = self.inbound.send(ChannelEvent::Closed { reason: None });
    }

    /// Messages sent on the channel, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Number of times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

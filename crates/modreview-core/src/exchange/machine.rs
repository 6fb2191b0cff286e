//! The single-owner task that drives one exchange instance.
//!
//! All state lives inside [`ExchangeMachine`]. The controller talks to it
//! through a command queue; the transport talks to it through the channel's
//! event queue; connect attempts report back through an internal queue. One
//! `select!` loop consumes all three, so every transition is applied to
//! completion before the next input is looked at.

use std::sync::Arc;
use std::time::Duration;

use modreview_transport::{Channel, ChannelEvent, Connector};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

use crate::config::ExchangeConfig;
use crate::domain::{ReviewResult, ReviewSubmission};
use crate::metrics::METRICS;
use crate::obs;
use crate::protocol::{self, Inbound, ProtocolError};
use crate::session::Session;

use super::error::{ExchangeError, ExchangeResult, WaitPhase};
use super::state::{ExchangeSnapshot, ExchangeState};

/// Callback invoked synchronously on every transition.
pub(crate) type StateHandler = Box<dyn FnMut(&ExchangeState) + Send>;

/// Requests from the controller.
pub(crate) enum Command {
    Compose {
        reply: oneshot::Sender<ExchangeResult<()>>,
    },
    Submit {
        submission: ReviewSubmission,
        reply: oneshot::Sender<ExchangeResult<()>>,
    },
    Retry {
        reply: oneshot::Sender<ExchangeResult<()>>,
    },
    Reclassify {
        reply: oneshot::Sender<ExchangeResult<()>>,
    },
    Cancel {
        reply: oneshot::Sender<ExchangeResult<()>>,
    },
    Observe {
        handler: StateHandler,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<ExchangeSnapshot>,
    },
}

/// Outcome of one connect attempt.
struct Opened {
    attempt: u64,
    outcome: ExchangeResult<Box<dyn Channel>>,
}

enum Step {
    Command(Command),
    Opened(Opened),
    Channel(Option<ChannelEvent>),
    Deadline,
    Shutdown,
}

pub(crate) struct ExchangeMachine {
    config: Arc<ExchangeConfig>,
    session: Session,
    connector: Arc<dyn Connector>,

    state: ExchangeState,
    draft: Option<ReviewSubmission>,
    last_result: Option<ReviewResult>,
    /// Present only while awaiting acknowledgement or result.
    channel: Option<Box<dyn Channel>>,

    /// Incremented per submission; stale connect outcomes are discarded.
    attempt: u64,
    connect_in_flight: bool,
    /// A submission arrived while an older connect was still pending.
    open_deferred: bool,
    deadline: Option<Instant>,
    protocol_errors: u32,
    anomaly_warned: bool,
    exchange_id: String,

    handlers: Vec<StateHandler>,
    state_tx: watch::Sender<ExchangeState>,
    commands: mpsc::Receiver<Command>,
    opened_tx: mpsc::UnboundedSender<Opened>,
    opened_rx: mpsc::UnboundedReceiver<Opened>,
}

/// Spawn the exchange task. Must be called within a Tokio runtime.
pub(crate) fn spawn_exchange(
    config: Arc<ExchangeConfig>,
    session: Session,
    connector: Arc<dyn Connector>,
) -> (mpsc::Sender<Command>, watch::Receiver<ExchangeState>) {
    let (commands_tx, commands) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(ExchangeState::Idle);
    let (opened_tx, opened_rx) = mpsc::unbounded_channel();

    let machine = ExchangeMachine {
        config,
        session,
        connector,
        state: ExchangeState::Idle,
        draft: None,
        last_result: None,
        channel: None,
        attempt: 0,
        connect_in_flight: false,
        open_deferred: false,
        deadline: None,
        protocol_errors: 0,
        anomaly_warned: false,
        exchange_id: String::new(),
        handlers: Vec::new(),
        state_tx,
        commands,
        opened_tx,
        opened_rx,
    };

    let span = tracing::info_span!("modreview.exchange_task");
    tokio::spawn(machine.run().instrument(span));
    (commands_tx, state_rx)
}

async fn next_channel_event(channel: &mut Option<Box<dyn Channel>>) -> Option<ChannelEvent> {
    match channel {
        Some(channel) => channel.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Fetch a fresh credential and open a channel, bounded by `connect_timeout`.
async fn open_channel(
    connector: &dyn Connector,
    session: &Session,
    endpoint: &str,
    connect_timeout: Duration,
) -> ExchangeResult<Box<dyn Channel>> {
    let credential = session
        .access_token()
        .await
        .map_err(|e| ExchangeError::Connection(format!("token store unavailable: {e}")))?
        .ok_or_else(|| ExchangeError::Connection("no access token in session".to_string()))?;

    match tokio::time::timeout(connect_timeout, connector.open(endpoint, &credential)).await {
        Ok(result) => result.map_err(ExchangeError::from),
        Err(_) => Err(ExchangeError::Connection(format!(
            "channel did not open within {connect_timeout:?}"
        ))),
    }
}

async fn close_quietly(channel: &mut dyn Channel) {
    if let Err(err) = channel.close().await {
        warn!(error = %err, "failed to close review channel");
    }
}

impl ExchangeMachine {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Shutdown,
                },
                Some(opened) = self.opened_rx.recv() => Step::Opened(opened),
                event = next_channel_event(&mut self.channel) => Step::Channel(event),
                _ = sleep_until_deadline(self.deadline) => Step::Deadline,
            };

            match step {
                Step::Command(command) => self.handle_command(command).await,
                Step::Opened(opened) => self.handle_opened(opened).await,
                Step::Channel(event) => self.handle_channel_event(event).await,
                Step::Deadline => self.handle_deadline().await,
                Step::Shutdown => {
                    self.release_channel().await;
                    debug!("controller dropped, exchange task exiting");
                    break;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Compose { reply } => {
                let _ = reply.send(self.compose());
            }
            Command::Submit { submission, reply } => {
                let _ = reply.send(self.submit(submission));
            }
            Command::Retry { reply } => {
                let _ = reply.send(self.retry().await);
            }
            Command::Reclassify { reply } => {
                let _ = reply.send(self.reclassify().await);
            }
            Command::Cancel { reply } => {
                let _ = reply.send(self.cancel().await);
            }
            Command::Observe { handler, reply } => {
                self.handlers.push(handler);
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn compose(&mut self) -> ExchangeResult<()> {
        match self.state {
            ExchangeState::Idle => {
                self.transition(ExchangeState::Composing);
                Ok(())
            }
            ExchangeState::Composing => Ok(()),
            _ => Err(self.invalid("compose")),
        }
    }

    fn submit(&mut self, submission: ReviewSubmission) -> ExchangeResult<()> {
        if matches!(self.state, ExchangeState::Idle) {
            self.transition(ExchangeState::Composing);
        }
        if !matches!(self.state, ExchangeState::Composing) {
            return Err(self.invalid("submit"));
        }

        self.exchange_id = uuid::Uuid::new_v4().to_string();
        self.attempt += 1;
        self.protocol_errors = 0;
        self.anomaly_warned = false;
        METRICS.inc_started();
        obs::emit_exchange_submitted(
            &self.exchange_id,
            submission.task_id(),
            submission.classification(),
        );
        self.draft = Some(submission);
        self.transition(ExchangeState::Connecting);

        // At most one channel per instance: wait for an abandoned connect to
        // settle before starting the next.
        if self.connect_in_flight {
            debug!(attempt = self.attempt, "deferring open until previous connect settles");
            self.open_deferred = true;
        } else {
            self.spawn_connect();
        }
        Ok(())
    }

    async fn retry(&mut self) -> ExchangeResult<()> {
        match self.state {
            ExchangeState::Failed(_) | ExchangeState::Resolved(_) => {
                self.release_channel().await;
                self.last_result = None;
                self.transition(ExchangeState::Composing);
                Ok(())
            }
            _ => Err(self.invalid("retry")),
        }
    }

    async fn reclassify(&mut self) -> ExchangeResult<()> {
        match self.state {
            ExchangeState::Resolved(_) => {
                self.release_channel().await;
                self.last_result = None;
                self.draft = None;
                self.transition(ExchangeState::Composing);
                Ok(())
            }
            _ => Err(self.invalid("reclassify")),
        }
    }

    async fn cancel(&mut self) -> ExchangeResult<()> {
        if matches!(self.state, ExchangeState::Idle) || self.state.is_terminal() {
            return Ok(());
        }

        let from = self.state.name();
        self.release_channel().await;
        self.deadline = None;
        self.open_deferred = false;
        self.draft = None;
        self.last_result = None;
        if self.state.is_in_flight() {
            METRICS.inc_cancelled();
        }
        obs::emit_exchange_cancelled(&self.exchange_id, from);
        self.transition(ExchangeState::Idle);
        Ok(())
    }

    fn snapshot(&self) -> ExchangeSnapshot {
        ExchangeSnapshot {
            state: self.state.clone(),
            pending_submission: self.draft.clone(),
            last_result: self.last_result.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Connecting
    // -----------------------------------------------------------------------

    fn spawn_connect(&mut self) {
        self.connect_in_flight = true;
        self.open_deferred = false;

        let attempt = self.attempt;
        let connector = Arc::clone(&self.connector);
        let session = self.session.clone();
        let endpoint = self.config.endpoint.clone();
        let connect_timeout = self.config.connect_timeout;
        let opened_tx = self.opened_tx.clone();

        tokio::spawn(
            async move {
                let outcome =
                    open_channel(connector.as_ref(), &session, &endpoint, connect_timeout).await;
                if let Err(mpsc::error::SendError(opened)) =
                    opened_tx.send(Opened { attempt, outcome })
                {
                    if let Ok(mut channel) = opened.outcome {
                        close_quietly(channel.as_mut()).await;
                    }
                }
            }
            .in_current_span(),
        );
    }

    async fn handle_opened(&mut self, opened: Opened) {
        self.connect_in_flight = false;

        let current =
            opened.attempt == self.attempt && matches!(self.state, ExchangeState::Connecting);
        if !current {
            if let Ok(mut channel) = opened.outcome {
                debug!(attempt = opened.attempt, "closing channel opened after cancel");
                close_quietly(channel.as_mut()).await;
            }
            if self.open_deferred {
                self.spawn_connect();
            }
            return;
        }

        let mut channel = match opened.outcome {
            Ok(channel) => channel,
            Err(err) => {
                self.fail(err).await;
                return;
            }
        };

        let Some(draft) = self.draft.as_ref() else {
            close_quietly(channel.as_mut()).await;
            self.fail(ExchangeError::Connection("no submission to send".to_string()))
                .await;
            return;
        };

        let message = protocol::encode_submission(draft);
        if let Err(err) = channel.send(&message).await {
            close_quietly(channel.as_mut()).await;
            self.fail(err.into()).await;
            return;
        }

        self.channel = Some(channel);
        self.arm_deadline();
        self.transition(ExchangeState::AwaitingAcknowledgement);
    }

    // -----------------------------------------------------------------------
    // Awaiting
    // -----------------------------------------------------------------------

    async fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Message(text)) => self.handle_frame(&text).await,
            Some(ChannelEvent::Error(reason)) => {
                self.fail(ExchangeError::Connection(reason)).await;
            }
            Some(ChannelEvent::Closed { reason: Some(reason) }) => {
                self.fail(ExchangeError::Connection(format!("channel closed: {reason}")))
                    .await;
            }
            Some(ChannelEvent::Closed { reason: None }) | None => {
                self.fail(ExchangeError::Connection("channel closed by peer".to_string()))
                    .await;
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        match protocol::decode_inbound(text) {
            Ok(Inbound::Acknowledgement { worker_id }) => {
                if matches!(self.state, ExchangeState::AwaitingAcknowledgement) {
                    debug!(worker_id = %worker_id, "worker accepted submission");
                    self.arm_deadline();
                    self.transition(ExchangeState::AwaitingResult);
                } else {
                    debug!(worker_id = %worker_id, "ignoring repeated acknowledgement");
                }
            }
            Ok(Inbound::Result(result)) => self.resolve(result).await,
            Err(err) => self.note_protocol_error(err),
        }
    }

    async fn resolve(&mut self, result: ReviewResult) {
        self.release_channel().await;
        self.deadline = None;
        METRICS.inc_resolved();
        if let Some(draft) = &self.draft {
            obs::emit_exchange_resolved(
                &self.exchange_id,
                draft.task_id(),
                &result.original_classification,
                &result.corrected_classification,
                result.updated_confidence,
            );
        }
        self.last_result = Some(result.clone());
        self.transition(ExchangeState::Resolved(result));
    }

    fn note_protocol_error(&mut self, err: ProtocolError) {
        self.protocol_errors += 1;
        METRICS.inc_protocol_errors();
        debug!(
            exchange_id = %self.exchange_id,
            count = self.protocol_errors,
            error = %err,
            "ignoring unrecognized frame"
        );
        if !self.anomaly_warned && self.protocol_errors >= self.config.protocol_warn_threshold {
            self.anomaly_warned = true;
            obs::emit_protocol_anomaly(&self.exchange_id, self.protocol_errors, &err);
        }
    }

    async fn handle_deadline(&mut self) {
        let phase = match self.state {
            ExchangeState::AwaitingAcknowledgement => WaitPhase::Acknowledgement,
            ExchangeState::AwaitingResult => WaitPhase::Result,
            _ => {
                self.deadline = None;
                return;
            }
        };
        let after = self.config.response_timeout.unwrap_or_default();
        self.fail(ExchangeError::Timeout { phase, after }).await;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// A bound too large to represent as an instant means no deadline.
    fn arm_deadline(&mut self) {
        self.deadline = self.config.response_timeout.and_then(|timeout| {
            let deadline = Instant::now().checked_add(timeout);
            if deadline.is_none() {
                debug!(?timeout, "response timeout out of range, waiting indefinitely");
            }
            deadline
        });
    }

    async fn release_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            close_quietly(channel.as_mut()).await;
        }
    }

    async fn fail(&mut self, error: ExchangeError) {
        self.release_channel().await;
        self.deadline = None;
        METRICS.inc_failed();
        obs::emit_exchange_failed(&self.exchange_id, &error);
        self.transition(ExchangeState::Failed(error));
    }

    fn invalid(&self, action: &'static str) -> ExchangeError {
        ExchangeError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    fn transition(&mut self, next: ExchangeState) {
        obs::emit_state_transition(&self.exchange_id, self.state.name(), next.name());
        self.state = next;
        for handler in self.handlers.iter_mut() {
            handler(&self.state);
        }
        self.state_tx.send_replace(self.state.clone());
    }
}

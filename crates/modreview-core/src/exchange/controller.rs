//! Caller-facing handle on an exchange.

use std::sync::Arc;

use modreview_transport::Connector;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ExchangeConfig;
use crate::domain::{ReviewResult, ReviewSubmission};
use crate::session::Session;

use super::error::{ExchangeError, ExchangeResult};
use super::machine::{spawn_exchange, Command};
use super::state::{ExchangeSnapshot, ExchangeState};

/// Handle on one review exchange instance.
///
/// Cloning yields another handle on the same instance. The underlying task
/// stops, closing any open channel, once every handle is dropped.
#[derive(Clone)]
pub struct ExchangeController {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ExchangeState>,
    config: Arc<ExchangeConfig>,
}

impl std::fmt::Debug for ExchangeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeController")
            .field("state", &*self.state.borrow())
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}

impl ExchangeController {
    /// Start a new exchange in `Idle`. Must be called within a Tokio runtime.
    pub fn spawn(config: ExchangeConfig, session: Session, connector: Arc<dyn Connector>) -> Self {
        let config = Arc::new(config);
        let (commands, state) = spawn_exchange(Arc::clone(&config), session, connector);
        Self {
            commands,
            state,
            config,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> ExchangeState {
        self.state.borrow().clone()
    }

    /// `Idle -> Composing`. A no-op while already composing.
    pub async fn compose(&self) -> ExchangeResult<()> {
        self.request(|reply| Command::Compose { reply }).await?
    }

    /// Validate and submit.
    ///
    /// Invalid input fails here with `ExchangeError::Validation` and nothing
    /// touches the network; the state is left as it was, so an invalid submit
    /// from `Idle` stays `Idle` rather than composing implicitly. Otherwise
    /// the exchange moves to `Connecting` and the outcome is reported through
    /// state changes. Refused with `InvalidTransition` while another
    /// submission is in flight.
    pub async fn submit(&self, submission: ReviewSubmission) -> ExchangeResult<()> {
        submission.validate(&self.config.classifications)?;
        self.request(|reply| Command::Submit { submission, reply })
            .await?
    }

    /// `Failed | Resolved -> Composing`, keeping the last draft.
    pub async fn retry(&self) -> ExchangeResult<()> {
        self.request(|reply| Command::Retry { reply }).await?
    }

    /// `Resolved -> Composing`, discarding both the result and the draft.
    pub async fn reclassify(&self) -> ExchangeResult<()> {
        self.request(|reply| Command::Reclassify { reply }).await?
    }

    /// Back to `Idle` from any non-terminal state, closing the channel.
    ///
    /// Safe while `Connecting`: a channel that opens afterwards is closed
    /// without sending. A no-op in `Idle` and terminal states.
    pub async fn cancel(&self) -> ExchangeResult<()> {
        self.request(|reply| Command::Cancel { reply }).await?
    }

    /// Register a handler called synchronously on every later transition,
    /// in order. The current state is not replayed.
    pub async fn on_state_change<F>(&self, handler: F) -> ExchangeResult<()>
    where
        F: FnMut(&ExchangeState) + Send + 'static,
    {
        let handler = Box::new(handler);
        self.request(|reply| Command::Observe { handler, reply })
            .await
    }

    /// Receive every later transition asynchronously.
    pub async fn subscribe(&self) -> ExchangeResult<mpsc::UnboundedReceiver<ExchangeState>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_state_change(move |state| {
            let _ = tx.send(state.clone());
        })
        .await?;
        Ok(rx)
    }

    /// The draft last submitted, kept across `retry()`.
    pub async fn pending_submission(&self) -> ExchangeResult<Option<ReviewSubmission>> {
        Ok(self.snapshot().await?.pending_submission)
    }

    pub async fn last_result(&self) -> ExchangeResult<Option<ReviewResult>> {
        Ok(self.snapshot().await?.last_result)
    }

    pub async fn snapshot(&self) -> ExchangeResult<ExchangeSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ExchangeResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ExchangeError::Shutdown)?;
        response.await.map_err(|_| ExchangeError::Shutdown)
    }
}

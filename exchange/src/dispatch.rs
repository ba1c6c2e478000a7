//! Post-commit job dispatch notification.
//!
//! Dispatch is informational: the `conversion-jobs` outbox record committed
//! with the job is the durable hand-off. A failed notification never affects
//! the committed job.

use async_trait::async_trait;
use fxledger_common::{ExchangeError, JobMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors raised while notifying the dispatch path.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Receiving side is gone.
    #[error("dispatch channel closed")]
    Closed,

    /// Channel is at capacity.
    #[error("dispatch channel full")]
    Full,

    /// Message could not be serialized.
    #[error("encode job message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<DispatchError> for ExchangeError {
    fn from(err: DispatchError) -> Self {
        ExchangeError::Dispatch(err.to_string())
    }
}

/// Hands a job reference to whatever drives the consumer.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, message: &JobMessage) -> Result<(), DispatchError>;
}

/// Feeds serialized job messages into an in-process channel.
#[derive(Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<String>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiver its messages arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobDispatcher for ChannelDispatcher {
    async fn dispatch(&self, message: &JobMessage) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(message)?;

        self.sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Full,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;

        debug!(job_id = %message.job_id, "Job dispatched");
        Ok(())
    }
}

/// Relies on the outbox alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl JobDispatcher for NoopDispatcher {
    async fn dispatch(&self, _message: &JobMessage) -> Result<(), DispatchError> {
        Ok(())
    }
}

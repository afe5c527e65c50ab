//! The [`DispatchBus`] trait and its subscription handle.

use std::sync::Arc;

use async_trait::async_trait;
use previewer_core::{Job, ResultMessage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Callback invoked by the bus for every delivered result.
///
/// May be called from any task or thread, concurrently with the
/// subscriber's own work.
pub type ResultHandler = Arc<dyn Fn(ResultMessage) + Send + Sync>;

/// Errors from a bus transport.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A job could not be handed to the transport.
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// No subscription could be established on the result topic.
    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// The job could not be encoded for the wire.
    #[error("Failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publish/subscribe transport between the dispatcher and workers.
///
/// Delivery is assumed at-least-once and unordered, with possible
/// duplicates and possible total loss.
#[async_trait]
pub trait DispatchBus: Send + Sync {
    /// Hand one job to the transport.
    async fn publish(&self, topic: &str, job: &Job) -> Result<(), BusError>;

    /// Start delivering results from `topic` to `on_result`.
    async fn subscribe(
        &self,
        topic: &str,
        on_result: ResultHandler,
    ) -> Result<Subscription, BusError>;

    /// Stop a subscription. Once this returns, `on_result` is not invoked
    /// again for it.
    async fn cancel(&self, subscription: Subscription) {
        subscription.cancel().await;
    }
}

/// Handle to an active result subscription.
///
/// Dropping the handle also signals cancellation, so a subscription can
/// never outlive the call that created it. Use [`cancel`](Self::cancel)
/// to additionally wait for the delivery task to finish.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a delivery task. The task must exit once `cancel` fires.
    pub fn new(topic: impl Into<String>, cancel: CancellationToken, task: Option<JoinHandle<()>>) -> Self {
        Self {
            topic: topic.into(),
            cancel,
            task,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Token observed by the delivery task.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signal cancellation and wait for the delivery task to exit.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(topic = %self.topic, error = %e, "Subscription task ended abnormally");
            }
        }
        tracing::debug!(topic = %self.topic, "Subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

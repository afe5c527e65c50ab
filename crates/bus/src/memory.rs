//! In-process dispatch bus backed by `tokio::sync::broadcast` channels.
//!
//! Each topic gets its own channel, created on first use. Jobs and
//! results travel on separate topic maps so one name can be reused for
//! both without collision.

use std::collections::HashMap;

use async_trait::async_trait;
use previewer_core::{parse_result, Job, ResultMessage};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bus::{BusError, DispatchBus, ResultHandler, Subscription};

/// Default buffer capacity for each topic channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus.
///
/// Workers call [`jobs`](Self::jobs) to receive published jobs and
/// [`deliver`](Self::deliver) to post results. When a channel buffer is
/// full the oldest messages are dropped and slow receivers observe a lag.
pub struct InMemoryBus {
    job_topics: RwLock<HashMap<String, broadcast::Sender<Job>>>,
    result_topics: RwLock<HashMap<String, broadcast::Sender<ResultMessage>>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            job_topics: RwLock::new(HashMap::new()),
            result_topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Receive every job published to `topic` from now on.
    pub async fn jobs(&self, topic: &str) -> broadcast::Receiver<Job> {
        sender_for(&self.job_topics, topic, self.capacity).await.subscribe()
    }

    /// Post a result to every subscriber of `topic`.
    ///
    /// Returns the number of subscribers that received it. Results posted
    /// with no subscriber are dropped, matching a lossy transport.
    pub async fn deliver(&self, topic: &str, result: ResultMessage) -> usize {
        let sender = sender_for(&self.result_topics, topic, self.capacity).await;
        sender.send(result).unwrap_or(0)
    }

    /// Parse a raw JSON result and deliver it.
    ///
    /// Malformed messages are logged and dropped.
    pub async fn deliver_raw(&self, topic: &str, text: &str) -> usize {
        match parse_result(text) {
            Ok(result) => self.deliver(topic, result).await,
            Err(e) => {
                tracing::warn!(
                    topic,
                    error = %e,
                    raw_message = %text,
                    "Dropping malformed result message",
                );
                0
            }
        }
    }

    /// Number of live result subscriptions on `topic`.
    pub async fn result_subscriber_count(&self, topic: &str) -> usize {
        self.result_topics
            .read()
            .await
            .get(topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl DispatchBus for InMemoryBus {
    async fn publish(&self, topic: &str, job: &Job) -> Result<(), BusError> {
        let sender = sender_for(&self.job_topics, topic, self.capacity).await;
        // A send error only means there is no worker listening right now.
        if sender.send(job.clone()).is_err() {
            tracing::debug!(topic, job_id = %job.id(), "Published job with no listening worker");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        on_result: ResultHandler,
    ) -> Result<Subscription, BusError> {
        let mut rx = sender_for(&self.result_topics, topic, self.capacity)
            .await
            .subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let topic_name = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(result) => on_result(result),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(topic = %topic_name, skipped, "Result subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        tracing::debug!(topic, "Result subscription started");
        Ok(Subscription::new(topic, cancel, Some(task)))
    }
}

/// Fetch the sender for `topic`, creating the channel on first use.
async fn sender_for<T: Clone>(
    topics: &RwLock<HashMap<String, broadcast::Sender<T>>>,
    topic: &str,
    capacity: usize,
) -> broadcast::Sender<T> {
    if let Some(sender) = topics.read().await.get(topic) {
        return sender.clone();
    }
    topics
        .write()
        .await
        .entry(topic.to_string())
        .or_insert_with(|| broadcast::channel(capacity).0)
        .clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

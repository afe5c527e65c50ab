//! Bounded wait for the results of one published batch.
//!
//! The collector subscribes to the result topic, publishes every job,
//! waits until each awaited job has a result or the deadline passes, then
//! cancels the subscription and resolves artifacts in job order.
//!
//! Bus deliveries are forwarded through an unbounded channel; only the
//! wait loop touches the [`Correlator`].

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use previewer_bus::{DispatchBus, ResultHandler};
use previewer_core::{
    Artifact, Job, JobBuilder, JobId, MissingReason, OutputSlots, ResultMessage, Slot,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::backoff::BackoffConfig;
use crate::config::DispatchConfig;
use crate::correlator::{Correlator, Delivery};
use crate::error::DispatchError;
use crate::resolver::{ArtifactResolver, ResolveError};

/// Slot state at the end of the publish phase.
#[derive(Debug)]
enum Pending {
    Awaiting(JobId),
    Unpublished { job_id: JobId, reason: String },
    /// The deadline passed before the job was accepted by the bus.
    Expired(JobId),
}

pub struct Collector {
    bus: Arc<dyn DispatchBus>,
    resolver: Arc<dyn ArtifactResolver>,
    config: DispatchConfig,
    backoff: BackoffConfig,
}

impl Collector {
    pub fn new(
        bus: Arc<dyn DispatchBus>,
        resolver: Arc<dyn ArtifactResolver>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            bus,
            resolver,
            config,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Publish `jobs` and collect their results.
    ///
    /// Returns exactly `min(jobs.len(), max_slots)` slots in job order.
    /// Jobs past `max_slots` are published but never awaited. `builder`
    /// must be the one that minted `jobs`; publish retries draw fresh ids
    /// from it.
    ///
    /// Only an invalid config or a failed subscription is an error.
    /// `deadline` bounds the whole call up to artifact resolution,
    /// publishing and publish retries included. Jobs not accepted by then
    /// are never published and their slots time out.
    pub async fn collect(
        &self,
        jobs: Vec<Job>,
        builder: &mut JobBuilder,
        deadline: Duration,
    ) -> Result<OutputSlots, DispatchError> {
        self.config.validate()?;
        let deadline_at = Instant::now() + deadline;
        let awaited = jobs.len().min(self.config.max_slots);
        let topic = self.config.result_topic.as_str();

        let correlator = Correlator::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ResultMessage>();
        let on_result: ResultHandler = Arc::new(move |result: ResultMessage| {
            // The receiver is gone once the batch has finished waiting.
            let _ = tx.send(result);
        });

        let subscription = self
            .bus
            .subscribe(topic, on_result)
            .await
            .map_err(DispatchError::Subscription)?;

        let mut pending = Vec::with_capacity(awaited);
        let mut skipped = 0usize;
        for (index, job) in jobs.into_iter().enumerate() {
            if Instant::now() >= deadline_at {
                skipped += 1;
                if index < awaited {
                    pending.push(Pending::Expired(job.id()));
                }
                continue;
            }

            let published = self.publish(job, builder, deadline_at).await;

            // Past the deadline nothing is recorded or registered; the
            // job's slot settles as timed out.
            if Instant::now() < deadline_at {
                // Anything already delivered is buffered before its id is registered.
                while let Ok(result) = rx.try_recv() {
                    record(&correlator, result);
                }
                if let Pending::Awaiting(job_id) = &published {
                    if index < awaited {
                        correlator.register([*job_id]);
                    }
                }
            }

            if index >= awaited {
                if let Pending::Awaiting(job_id) = published {
                    tracing::debug!(job_id = %job_id, index, "Published job beyond slot limit, not awaited");
                }
                continue;
            }
            pending.push(published);
        }

        if skipped > 0 {
            tracing::warn!(topic, skipped, "Deadline elapsed before every job was published");
        }

        tracing::info!(
            topic,
            awaited = pending.len(),
            remaining = correlator.remaining(),
            "Waiting for results",
        );

        let timed_out = loop {
            if correlator.remaining() == 0 {
                break false;
            }
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline_at) => break true,
                received = rx.recv() => match received {
                    Some(result) => record(&correlator, result),
                    None => {
                        tracing::warn!(topic, "Result subscription ended before all results arrived");
                        break true;
                    }
                },
                _ = tokio::time::sleep(self.config.recheck_interval) => {}
            }
        };

        self.bus.cancel(subscription).await;
        drop(rx);
        let mut session = correlator.close();

        if timed_out && !session.missing.is_empty() {
            tracing::warn!(
                topic,
                missing = session.missing.len(),
                deadline_secs = deadline.as_secs_f64(),
                "Deadline elapsed with results outstanding",
            );
        }
        if session.unclaimed > 0 {
            tracing::debug!(unclaimed = session.unclaimed, "Discarded results for unknown jobs");
        }

        let settlements: Vec<_> = pending
            .into_iter()
            .enumerate()
            .map(|(slot, pending)| {
                let result = match &pending {
                    Pending::Awaiting(job_id) => session.resolved.remove(job_id),
                    Pending::Unpublished { .. } | Pending::Expired(_) => None,
                };
                (slot, pending, result)
            })
            .collect();

        let slots: Vec<Slot> = stream::iter(settlements)
            .map(|(slot, pending, result)| self.settle(slot, pending, result))
            .buffered(self.config.resolve_concurrency)
            .collect()
            .await;

        Ok(OutputSlots::new(slots))
    }

    /// Publish with up to `publish_attempts` tries, rebuilding the job
    /// under a fresh id before each retry.
    ///
    /// Every attempt runs under `deadline_at`. A retry whose backoff pause
    /// would reach the deadline is not made. Returns
    /// [`Pending::Awaiting`] with the accepted id, or the last id tried.
    async fn publish(&self, job: Job, builder: &mut JobBuilder, deadline_at: Instant) -> Pending {
        let topic = self.config.job_topic.as_str();
        let attempts = self.config.publish_attempts.max(1);
        let mut delays = self.backoff.delays();
        let mut job = job;
        let mut attempt = 1u32;

        loop {
            let Ok(outcome) = tokio::time::timeout_at(deadline_at, self.bus.publish(topic, &job)).await
            else {
                tracing::warn!(topic, job_id = %job.id(), attempt, "Deadline elapsed while publishing job");
                return Pending::Expired(job.id());
            };

            let e = match outcome {
                Ok(()) => {
                    tracing::debug!(topic, job_id = %job.id(), attempt, "Published job");
                    return Pending::Awaiting(job.id());
                }
                Err(e) => e,
            };

            let delay = delays.next().unwrap_or(self.backoff.max_delay);
            if attempt >= attempts || Instant::now() + delay >= deadline_at {
                tracing::error!(topic, job_id = %job.id(), attempt, error = %e, "Failed to publish job");
                return Pending::Unpublished {
                    job_id: job.id(),
                    reason: e.to_string(),
                };
            }

            tracing::warn!(
                topic,
                job_id = %job.id(),
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "Publish attempt {attempt} failed, retrying",
            );
            tokio::time::sleep(delay).await;
            job = builder.rebuild(&job);
            attempt += 1;
        }
    }

    /// Turn one pending slot into its final state.
    async fn settle(&self, slot: usize, pending: Pending, result: Option<ResultMessage>) -> Slot {
        let job_id = match pending {
            Pending::Unpublished { job_id, reason } => {
                return Slot::Missing {
                    job_id,
                    reason: MissingReason::PublishFailed(reason),
                };
            }
            Pending::Expired(job_id) => {
                return Slot::Missing {
                    job_id,
                    reason: MissingReason::TimedOut,
                };
            }
            Pending::Awaiting(job_id) => job_id,
        };

        let Some(result) = result else {
            tracing::warn!(slot, job_id = %job_id, "No result before deadline");
            return Slot::Missing {
                job_id,
                reason: MissingReason::TimedOut,
            };
        };

        if !result.is_ok() {
            let error = result
                .error
                .unwrap_or_else(|| "worker reported an error".to_string());
            tracing::warn!(slot, job_id = %job_id, error = %error, "Job failed on worker");
            return Slot::Missing {
                job_id,
                reason: MissingReason::JobFailed(error),
            };
        }

        match self.resolve(&result.artifact_ref).await {
            Ok(bytes) => {
                tracing::debug!(slot, job_id = %job_id, size = bytes.len(), "Resolved artifact");
                Slot::Ready(Artifact {
                    job_id,
                    artifact_ref: result.artifact_ref,
                    bytes,
                })
            }
            Err(e) => {
                tracing::warn!(
                    slot,
                    job_id = %job_id,
                    artifact_ref = %result.artifact_ref,
                    error = %e,
                    "Failed to resolve artifact",
                );
                Slot::Missing {
                    job_id,
                    reason: MissingReason::ResolveFailed(e.to_string()),
                }
            }
        }
    }

    async fn resolve(&self, artifact_ref: &str) -> Result<Vec<u8>, ResolveError> {
        let limit = self.config.resolve_timeout;
        tokio::time::timeout(limit, self.resolver.resolve(artifact_ref))
            .await
            .map_err(|_| ResolveError::TimedOut(limit))?
    }
}

fn record(correlator: &Correlator, result: ResultMessage) {
    let job_id = result.job_id;
    match correlator.on_result(result) {
        Delivery::Matched => tracing::debug!(job_id = %job_id, "Result matched"),
        Delivery::Buffered => tracing::debug!(job_id = %job_id, "Result for unregistered job buffered"),
        Delivery::Duplicate => tracing::debug!(job_id = %job_id, "Duplicate result ignored"),
        Delivery::Discarded => tracing::debug!(job_id = %job_id, "Result after close discarded"),
    }
}

//! Caller-facing entry point: template + variations in, ordered slots out.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use previewer_bus::DispatchBus;
use previewer_core::{Job, JobBuilder, JobTemplate, OutputSlots, Variation};

use crate::backoff::BackoffConfig;
use crate::collector::Collector;
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::resolver::ArtifactResolver;

/// Fans a template out into jobs and collects their artifacts.
///
/// Holds no per-batch state; one dispatcher can run any number of
/// batches, each with its own correlation session.
pub struct Dispatcher {
    bus: Arc<dyn DispatchBus>,
    resolver: Arc<dyn ArtifactResolver>,
    config: DispatchConfig,
    backoff: BackoffConfig,
}

impl Dispatcher {
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

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run a batch with the configured slot limit and deadline.
    pub async fn dispatch(
        &self,
        template: &JobTemplate,
        variations: &[Variation],
    ) -> Result<OutputSlots, DispatchError> {
        self.dispatch_batch(template, variations, self.config.max_slots, self.config.deadline)
            .await
    }

    /// Load the template at `path` and run a batch with the configured
    /// slot limit and deadline.
    pub async fn dispatch_file(
        &self,
        path: impl AsRef<Path>,
        variations: &[Variation],
    ) -> Result<OutputSlots, DispatchError> {
        let template = JobTemplate::load(path)?;
        template.validate_nodes()?;
        self.dispatch(&template, variations).await
    }

    /// Build one job per variation, publish all of them and wait for the
    /// first `max_slots`.
    ///
    /// The result always has `min(variations.len(), max_slots)` slots in
    /// variation order. Timeouts and per-job failures show up as missing
    /// slots. A zero `max_slots` or `deadline` (or any other zero setting)
    /// is rejected before anything is published, and a failed result
    /// subscription aborts the batch.
    pub async fn dispatch_batch(
        &self,
        template: &JobTemplate,
        variations: &[Variation],
        max_slots: usize,
        deadline: Duration,
    ) -> Result<OutputSlots, DispatchError> {
        let config = DispatchConfig {
            max_slots,
            deadline,
            ..self.config.clone()
        };
        config.validate()?;

        let mut builder = JobBuilder::new();
        let jobs = self.build_jobs(&mut builder, template, variations);

        tracing::info!(
            variations = variations.len(),
            max_slots,
            deadline_secs = deadline.as_secs_f64(),
            job_topic = %self.config.job_topic,
            "Dispatching batch",
        );

        let collector = Collector::new(Arc::clone(&self.bus), Arc::clone(&self.resolver), config)
            .with_backoff(self.backoff.clone());
        let slots = collector.collect(jobs, &mut builder, deadline).await?;

        tracing::info!(summary = %slots.summary(), "Batch finished");
        Ok(slots)
    }

    fn build_jobs(
        &self,
        builder: &mut JobBuilder,
        template: &JobTemplate,
        variations: &[Variation],
    ) -> Vec<Job> {
        variations
            .iter()
            .enumerate()
            .map(|(index, variation)| {
                let (payload, skipped) = template.apply_report(variation, &self.config.override_paths);
                for skip in &skipped {
                    tracing::debug!(
                        index,
                        kind = %skip.kind,
                        path = ?skip.path.as_ref().map(|p| p.to_pointer()),
                        reason = ?skip.reason,
                        "Override not applied",
                    );
                }
                builder.build(payload, variation.auxiliary_refs().iter().cloned())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use previewer_bus::InMemoryBus;

    use super::*;
    use crate::config::ConfigError;
    use crate::resolver::FileArtifactResolver;

    #[tokio::test]
    async fn dispatch_file_rejects_invalid_templates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        std::fs::write(&path, r#"{"81": {"inputs": {}}}"#).unwrap();

        let dispatcher = Dispatcher::new(
            Arc::new(InMemoryBus::default()),
            Arc::new(FileArtifactResolver::new()),
            DispatchConfig::default(),
        );
        assert_matches!(
            dispatcher.dispatch_file(&path, &[Variation::seed(1)]).await,
            Err(DispatchError::Template(_))
        );
        assert_matches!(
            dispatcher.dispatch_file(dir.path().join("missing.json"), &[]).await,
            Err(DispatchError::Template(_))
        );
    }

    #[tokio::test]
    async fn zero_settings_are_rejected_before_publishing() {
        let bus = Arc::new(InMemoryBus::default());
        let mut jobs = bus.jobs("preview.jobs").await;
        let template = JobTemplate::from_value(serde_json::json!({
            "81": {"class_type": "RandomNoise", "inputs": {"noise_seed": 0}}
        }))
        .unwrap();
        let variations = [Variation::seed(1)];

        let dispatcher = Dispatcher::new(
            Arc::clone(&bus) as Arc<dyn DispatchBus>,
            Arc::new(FileArtifactResolver::new()),
            DispatchConfig {
                job_topic: "preview.jobs".into(),
                ..DispatchConfig::default()
            },
        );
        assert_matches!(
            dispatcher
                .dispatch_batch(&template, &variations, 0, Duration::from_secs(1))
                .await,
            Err(DispatchError::Config(ConfigError::Zero("PREVIEW_MAX_SLOTS")))
        );
        assert_matches!(
            dispatcher
                .dispatch_batch(&template, &variations, 1, Duration::ZERO)
                .await,
            Err(DispatchError::Config(ConfigError::Zero("PREVIEW_DEADLINE_SECS")))
        );

        let spinning = Dispatcher::new(
            Arc::clone(&bus) as Arc<dyn DispatchBus>,
            Arc::new(FileArtifactResolver::new()),
            DispatchConfig {
                job_topic: "preview.jobs".into(),
                recheck_interval: Duration::ZERO,
                ..DispatchConfig::default()
            },
        );
        assert_matches!(
            spinning.dispatch(&template, &variations).await,
            Err(DispatchError::Config(ConfigError::Zero("PREVIEW_RECHECK_INTERVAL_MS")))
        );

        assert!(jobs.try_recv().is_err(), "nothing may be published");
    }
}

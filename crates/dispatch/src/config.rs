use std::str::FromStr;
use std::time::Duration;

use previewer_core::{FieldPath, OverrideKind, OverridePaths};

/// Error raised when an environment value cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got '{value}'")]
    Parse {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{var} contains an invalid field path '{value}'")]
    Path { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Dispatcher configuration loaded from environment variables.
///
/// All fields have defaults matching a single four-up preview batch.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on awaited jobs and returned slots (default: `4`).
    pub max_slots: usize,
    /// Total time a batch may wait for results (default: 30 s).
    pub deadline: Duration,
    /// Longest the wait loop sleeps without re-checking (default: 250 ms).
    pub recheck_interval: Duration,
    /// Topic jobs are published to.
    pub job_topic: String,
    /// Topic results are read from.
    pub result_topic: String,
    /// Publish attempts per job, including the first (default: `1`).
    pub publish_attempts: u32,
    /// Bound on a single artifact resolve (default: 30 s).
    pub resolve_timeout: Duration,
    /// Resolver calls in flight at once (default: `4`).
    pub resolve_concurrency: usize,
    /// Where each override kind is written in the template.
    pub override_paths: OverridePaths,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_slots: 4,
            deadline: Duration::from_secs(30),
            recheck_interval: Duration::from_millis(250),
            job_topic: "space-previewer".into(),
            result_topic: "space-previewer-result".into(),
            publish_attempts: 1,
            resolve_timeout: Duration::from_secs(30),
            resolve_concurrency: 4,
            override_paths: default_override_paths(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `PREVIEW_MAX_SLOTS`            | `4`                      |
    /// | `PREVIEW_DEADLINE_SECS`        | `30`                     |
    /// | `PREVIEW_RECHECK_INTERVAL_MS`  | `250`                    |
    /// | `PREVIEW_JOB_TOPIC`            | `space-previewer`        |
    /// | `PREVIEW_RESULT_TOPIC`         | `space-previewer-result` |
    /// | `PREVIEW_PUBLISH_ATTEMPTS`     | `1`                      |
    /// | `PREVIEW_RESOLVE_TIMEOUT_SECS` | `30`                     |
    /// | `PREVIEW_RESOLVE_CONCURRENCY`  | `4`                      |
    /// | `PREVIEW_TEXT_PATHS`           | `/530/inputs/text`       |
    /// | `PREVIEW_SEED_PATHS`           | `/81/inputs/noise_seed`  |
    /// | `PREVIEW_MODEL_PATHS`          | (none)                   |
    ///
    /// Path variables hold comma-separated JSON pointers; setting one to
    /// an empty string disables that override kind.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_slots = parse_or(&lookup, "PREVIEW_MAX_SLOTS", defaults.max_slots, "usize")?;
        let deadline_secs = parse_or(
            &lookup,
            "PREVIEW_DEADLINE_SECS",
            defaults.deadline.as_secs(),
            "u64",
        )?;
        let recheck_ms = parse_or(
            &lookup,
            "PREVIEW_RECHECK_INTERVAL_MS",
            defaults.recheck_interval.as_millis() as u64,
            "u64",
        )?;
        let publish_attempts = parse_or(
            &lookup,
            "PREVIEW_PUBLISH_ATTEMPTS",
            defaults.publish_attempts,
            "u32",
        )?;
        let resolve_timeout_secs = parse_or(
            &lookup,
            "PREVIEW_RESOLVE_TIMEOUT_SECS",
            defaults.resolve_timeout.as_secs(),
            "u64",
        )?;
        let resolve_concurrency = parse_or(
            &lookup,
            "PREVIEW_RESOLVE_CONCURRENCY",
            defaults.resolve_concurrency,
            "usize",
        )?;

        let job_topic = lookup("PREVIEW_JOB_TOPIC").unwrap_or(defaults.job_topic);
        let result_topic = lookup("PREVIEW_RESULT_TOPIC").unwrap_or(defaults.result_topic);

        let mut override_paths = OverridePaths::new();
        for (var, kind, default) in [
            ("PREVIEW_TEXT_PATHS", OverrideKind::Text, DEFAULT_TEXT_PATH),
            ("PREVIEW_SEED_PATHS", OverrideKind::Seed, DEFAULT_SEED_PATH),
            ("PREVIEW_MODEL_PATHS", OverrideKind::Model, ""),
        ] {
            let raw = lookup(var).unwrap_or_else(|| default.to_string());
            for path in parse_paths(var, &raw)? {
                override_paths.insert(kind.clone(), path);
            }
        }

        let config = Self {
            max_slots,
            deadline: Duration::from_secs(deadline_secs),
            recheck_interval: Duration::from_millis(recheck_ms),
            job_topic,
            result_topic,
            publish_attempts,
            resolve_timeout: Duration::from_secs(resolve_timeout_secs),
            resolve_concurrency,
            override_paths,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a batch unable to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_slots == 0 {
            return Err(ConfigError::Zero("PREVIEW_MAX_SLOTS"));
        }
        if self.deadline.is_zero() {
            return Err(ConfigError::Zero("PREVIEW_DEADLINE_SECS"));
        }
        if self.recheck_interval.is_zero() {
            return Err(ConfigError::Zero("PREVIEW_RECHECK_INTERVAL_MS"));
        }
        if self.publish_attempts == 0 {
            return Err(ConfigError::Zero("PREVIEW_PUBLISH_ATTEMPTS"));
        }
        if self.resolve_timeout.is_zero() {
            return Err(ConfigError::Zero("PREVIEW_RESOLVE_TIMEOUT_SECS"));
        }
        if self.resolve_concurrency == 0 {
            return Err(ConfigError::Zero("PREVIEW_RESOLVE_CONCURRENCY"));
        }
        Ok(())
    }

    pub fn with_override_paths(mut self, paths: OverridePaths) -> Self {
        self.override_paths = paths;
        self
    }
}

const DEFAULT_TEXT_PATH: &str = "/530/inputs/text";
const DEFAULT_SEED_PATH: &str = "/81/inputs/noise_seed";

/// Prompt and noise-seed inputs of the stock preview workflow.
fn default_override_paths() -> OverridePaths {
    OverridePaths::new()
        .with(OverrideKind::Text, FieldPath::node_input("530", "text"))
        .with(OverrideKind::Seed, FieldPath::node_input("81", "noise_seed"))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Parse {
            var,
            expected,
            value,
        }),
    }
}

fn parse_paths(var: &'static str, raw: &str) -> Result<Vec<FieldPath>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            FieldPath::parse(s).map_err(|_| ConfigError::Path {
                var,
                value: s.to_string(),
            })
        })
        .collect()
}

use previewer_bus::BusError;
use previewer_core::TemplateError;

use crate::config::ConfigError;

/// Failures that abort a whole batch.
///
/// Everything else (publish, worker, resolve failures, timeouts) is
/// reported per slot in the returned output.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Result subscription failed: {0}")]
    Subscription(#[source] BusError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

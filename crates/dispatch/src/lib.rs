//! Job fan-out and correlated result collection.
//!
//! [`Dispatcher::dispatch_batch`] applies each variation to a template,
//! publishes the resulting jobs on a [`previewer_bus::DispatchBus`], and
//! waits under a deadline for their results. The [`Correlator`] matches
//! results to jobs, the [`Collector`] owns the wait, and an
//! [`ArtifactResolver`] fetches each finished artifact.

pub mod backoff;
pub mod collector;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod resolver;

pub use backoff::BackoffConfig;
pub use collector::Collector;
pub use config::{ConfigError, DispatchConfig};
pub use correlator::{ClosedSession, Correlator, Delivery};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use resolver::{
    ArtifactResolver, FileArtifactResolver, HttpArtifactResolver, ResolveError, ResolverRegistry,
};

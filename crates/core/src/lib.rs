//! Domain types and pure logic for the batch previewer.
//!
//! Everything in this crate is synchronous and free of I/O apart from
//! [`template::JobTemplate::load`]: templates and override paths, variation
//! parsing, sweep expansion, job construction, result wire messages, and
//! the order-stable [`slots::OutputSlots`] handed back to callers.

pub mod discovery;
pub mod error;
pub mod job;
pub mod message;
pub mod paths;
pub mod slots;
pub mod sweep;
pub mod template;
pub mod types;
pub mod variation;

pub use error::{CoreError, TemplateError};
pub use job::{Job, JobBuilder};
pub use message::{parse_result, ResultMessage, ResultStatus};
pub use paths::{FieldPath, OverrideKind, OverridePaths, ValueKind};
pub use slots::{Artifact, MissingReason, OutputSlots, Slot, SlotSummary};
pub use template::JobTemplate;
pub use types::JobId;
pub use variation::Variation;

//! Result messages delivered back from workers.
//!
//! Workers reply with a JSON document of the shape
//! `{"job_id": "<uuid>", "artifact_ref": "<url>", "status": "ok"}`. The
//! older `{"id": .., "url": ..}` form is accepted as well.

use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Outcome reported by the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Ok,
    Error,
}

/// A result for one job, as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(alias = "id")]
    pub job_id: JobId,
    /// Where the output lives (URL, blob path). Empty for failed jobs.
    #[serde(alias = "url", default)]
    pub artifact_ref: String,
    #[serde(default)]
    pub status: ResultStatus,
    /// Worker-side error description when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultMessage {
    pub fn ok(job_id: JobId, artifact_ref: impl Into<String>) -> Self {
        Self {
            job_id,
            artifact_ref: artifact_ref.into(),
            status: ResultStatus::Ok,
            error: None,
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            job_id,
            artifact_ref: String::new(),
            status: ResultStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}

/// Parse a result message from JSON text.
///
/// Returns `Err` for malformed JSON or a non-UUID id. Callers should log
/// and drop such messages.
pub fn parse_result(text: &str) -> Result<ResultMessage, serde_json::Error> {
    serde_json::from_str(text)
}

//! Immutable job records and the builder that mints their identifiers.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::template::JobTemplate;
use crate::types::{JobId, Timestamp};

/// One unit of dispatched work: a template with a variation applied.
///
/// Serializes as `{"id": .., "workflow": .., "auxiliary_refs": [..]}`.
/// Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    #[serde(rename = "workflow")]
    payload: JobTemplate,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    auxiliary_refs: BTreeSet<String>,
    #[serde(skip, default = "chrono::Utc::now")]
    created_at: Timestamp,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn payload(&self) -> &JobTemplate {
        &self.payload
    }

    /// Asset identifiers that must be uploaded before the job can run.
    pub fn auxiliary_refs(&self) -> &BTreeSet<String> {
        &self.auxiliary_refs
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Encode as the JSON wire message.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Mints jobs with identifiers that are unique within one dispatch session.
///
/// Every call to [`build`](Self::build) or [`rebuild`](Self::rebuild)
/// yields a never-before-issued id, so a retried publish can never be
/// confused with the attempt it replaces.
#[derive(Debug, Default)]
pub struct JobBuilder {
    issued: HashSet<JobId>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        &mut self,
        payload: JobTemplate,
        auxiliary_refs: impl IntoIterator<Item = String>,
    ) -> Job {
        Job {
            id: self.fresh_id(),
            payload,
            auxiliary_refs: auxiliary_refs.into_iter().collect(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Same payload and references as `job`, under a fresh id.
    pub fn rebuild(&mut self, job: &Job) -> Job {
        self.build(job.payload.clone(), job.auxiliary_refs.iter().cloned())
    }

    /// Number of ids handed out so far.
    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    fn fresh_id(&mut self) -> JobId {
        loop {
            let id = JobId::new_random();
            if self.issued.insert(id) {
                return id;
            }
        }
    }
}

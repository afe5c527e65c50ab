//! Order-stable output of a dispatch call.
//!
//! Slot *i* always corresponds to variation *i*. A slot is either a
//! resolved [`Artifact`] or an explicit missing marker saying why.

use std::fmt;

use crate::types::JobId;

/// Materialized output of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub job_id: JobId,
    pub artifact_ref: String,
    pub bytes: Vec<u8>,
}

/// Why a slot holds no artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    /// No result arrived before the deadline.
    TimedOut,
    /// The job could not be published.
    PublishFailed(String),
    /// The worker reported an error for the job.
    JobFailed(String),
    /// A result arrived but its artifact could not be fetched.
    ResolveFailed(String),
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out"),
            Self::PublishFailed(e) => write!(f, "publish failed: {e}"),
            Self::JobFailed(e) => write!(f, "job failed: {e}"),
            Self::ResolveFailed(e) => write!(f, "resolve failed: {e}"),
        }
    }
}

/// One output position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Ready(Artifact),
    Missing { job_id: JobId, reason: MissingReason },
}

impl Slot {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Ready(artifact) => artifact.job_id,
            Self::Missing { job_id, .. } => *job_id,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Ready(artifact) => Some(artifact),
            Self::Missing { .. } => None,
        }
    }

    pub fn missing_reason(&self) -> Option<&MissingReason> {
        match self {
            Self::Ready(_) => None,
            Self::Missing { reason, .. } => Some(reason),
        }
    }
}

/// Per-reason counts over a set of slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotSummary {
    pub ready: usize,
    pub timed_out: usize,
    pub publish_failed: usize,
    pub job_failed: usize,
    pub resolve_failed: usize,
}

impl SlotSummary {
    pub fn missing(&self) -> usize {
        self.timed_out + self.publish_failed + self.job_failed + self.resolve_failed
    }
}

impl fmt::Display for SlotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ready, {} missing (timed out {}, publish failed {}, job failed {}, resolve failed {})",
            self.ready,
            self.missing(),
            self.timed_out,
            self.publish_failed,
            self.job_failed,
            self.resolve_failed,
        )
    }
}

/// The ordered result sequence returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSlots {
    slots: Vec<Slot>,
}

impl OutputSlots {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot> {
        self.slots.iter()
    }

    pub fn into_vec(self) -> Vec<Slot> {
        self.slots
    }

    pub fn ready_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_ready()).count()
    }

    /// Exactly `arity` entries: artifacts in order, `None` for missing
    /// slots and for padding. Extra slots beyond `arity` are dropped.
    pub fn to_fixed_arity(&self, arity: usize) -> Vec<Option<Artifact>> {
        let mut out: Vec<Option<Artifact>> = self
            .slots
            .iter()
            .take(arity)
            .map(|slot| slot.artifact().cloned())
            .collect();
        out.resize(arity, None);
        out
    }

    pub fn summary(&self) -> SlotSummary {
        let mut summary = SlotSummary::default();
        for slot in &self.slots {
            match slot.missing_reason() {
                None => summary.ready += 1,
                Some(MissingReason::TimedOut) => summary.timed_out += 1,
                Some(MissingReason::PublishFailed(_)) => summary.publish_failed += 1,
                Some(MissingReason::JobFailed(_)) => summary.job_failed += 1,
                Some(MissingReason::ResolveFailed(_)) => summary.resolve_failed += 1,
            }
        }
        summary
    }
}

impl IntoIterator for OutputSlots {
    type Item = Slot;
    type IntoIter = std::vec::IntoIter<Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

impl<'a> IntoIterator for &'a OutputSlots {
    type Item = &'a Slot;
    type IntoIter = std::slice::Iter<'a, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(bytes: &[u8]) -> Slot {
        Slot::Ready(Artifact {
            job_id: JobId::new_random(),
            artifact_ref: "mem://x".into(),
            bytes: bytes.to_vec(),
        })
    }

    fn missing(reason: MissingReason) -> Slot {
        Slot::Missing {
            job_id: JobId::new_random(),
            reason,
        }
    }

    #[test]
    fn fixed_arity_pads_with_none() {
        let slots = OutputSlots::new(vec![ready(b"a"), missing(MissingReason::TimedOut)]);
        let fixed = slots.to_fixed_arity(4);
        assert_eq!(fixed.len(), 4);
        assert_eq!(fixed[0].as_ref().map(|a| a.bytes.as_slice()), Some(&b"a"[..]));
        assert!(fixed[1..].iter().all(Option::is_none));
    }

    #[test]
    fn fixed_arity_truncates() {
        let slots = OutputSlots::new(vec![ready(b"a"), ready(b"b"), ready(b"c")]);
        assert_eq!(slots.to_fixed_arity(2).len(), 2);
    }

    #[test]
    fn summary_counts_each_reason() {
        let slots = OutputSlots::new(vec![
            ready(b"a"),
            missing(MissingReason::TimedOut),
            missing(MissingReason::PublishFailed("down".into())),
            missing(MissingReason::ResolveFailed("404".into())),
            missing(MissingReason::JobFailed("oom".into())),
        ]);
        let summary = slots.summary();
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.missing(), 4);
        assert_eq!(summary.resolve_failed, 1);
        assert_eq!(slots.ready_count(), 1);
    }

    #[test]
    fn missing_reason_display() {
        assert_eq!(
            MissingReason::ResolveFailed("HTTP 404".into()).to_string(),
            "resolve failed: HTTP 404"
        );
    }
}

//! Matches asynchronously delivered results to outstanding job ids.
//!
//! The correlator is the only shared mutable state in a batch. Every
//! mutation happens under one [`parking_lot::Mutex`], so
//! [`on_result`](Correlator::on_result) may be called from any task while
//! the collector reads [`remaining`](Correlator::remaining).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use previewer_core::{JobId, ResultMessage};

/// What happened to a delivered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resolved an outstanding job.
    Matched,
    /// Arrived before its id was registered; held until it is.
    Buffered,
    /// The job already has a result. First write wins.
    Duplicate,
    /// The session is closed.
    Discarded,
}

/// Final state handed over by [`Correlator::close`].
#[derive(Debug, Default)]
pub struct ClosedSession {
    /// First result received for each registered job.
    pub resolved: HashMap<JobId, ResultMessage>,
    /// Registered ids that never received a result.
    pub missing: HashSet<JobId>,
    /// Buffered results whose id was never registered.
    pub unclaimed: usize,
}

#[derive(Debug, Default)]
struct State {
    outstanding: HashSet<JobId>,
    resolved: HashMap<JobId, ResultMessage>,
    unclaimed: HashMap<JobId, ResultMessage>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct Correlator {
    state: Mutex<State>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start awaiting `ids`.
    ///
    /// Results already buffered for any of them are claimed immediately.
    /// Returns how many were claimed that way. Ids already known are
    /// ignored, and nothing is registered once the session is closed.
    pub fn register(&self, ids: impl IntoIterator<Item = JobId>) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }

        let mut claimed = 0;
        for id in ids {
            if state.resolved.contains_key(&id) || state.outstanding.contains(&id) {
                continue;
            }
            match state.unclaimed.remove(&id) {
                Some(result) => {
                    state.resolved.insert(id, result);
                    claimed += 1;
                }
                None => {
                    state.outstanding.insert(id);
                }
            }
        }
        claimed
    }

    /// Record a delivered result.
    pub fn on_result(&self, result: ResultMessage) -> Delivery {
        let mut state = self.state.lock();
        if state.closed {
            return Delivery::Discarded;
        }

        let id = result.job_id;
        if state.outstanding.remove(&id) {
            state.resolved.insert(id, result);
            Delivery::Matched
        } else if state.resolved.contains_key(&id) || state.unclaimed.contains_key(&id) {
            Delivery::Duplicate
        } else {
            state.unclaimed.insert(id, result);
            Delivery::Buffered
        }
    }

    /// Number of registered ids still waiting for a result.
    pub fn remaining(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// End the session.
    ///
    /// Outstanding ids are force-removed as missing and unclaimed results
    /// are dropped. Later deliveries are discarded. Calling `close` again
    /// returns an empty session.
    pub fn close(&self) -> ClosedSession {
        let mut state = self.state.lock();
        state.closed = true;
        ClosedSession {
            resolved: std::mem::take(&mut state.resolved),
            missing: std::mem::take(&mut state.outstanding),
            unclaimed: std::mem::take(&mut state.unclaimed).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn ids(n: usize) -> Vec<JobId> {
        (0..n).map(|_| JobId::new_random()).collect()
    }

    fn ok(id: JobId, artifact_ref: &str) -> ResultMessage {
        ResultMessage::ok(id, artifact_ref)
    }

    #[test]
    fn matches_registered_results() {
        let correlator = Correlator::new();
        let ids = ids(3);
        correlator.register(ids.clone());
        assert_eq!(correlator.remaining(), 3);

        assert_eq!(correlator.on_result(ok(ids[2], "c")), Delivery::Matched);
        assert_eq!(correlator.on_result(ok(ids[0], "a")), Delivery::Matched);
        assert_eq!(correlator.remaining(), 1);

        let session = correlator.close();
        assert_eq!(session.resolved.len(), 2);
        assert_eq!(session.missing, HashSet::from([ids[1]]));
    }

    #[test]
    fn duplicate_keeps_first_result() {
        let correlator = Correlator::new();
        let id = JobId::new_random();
        correlator.register([id]);

        assert_eq!(correlator.on_result(ok(id, "first")), Delivery::Matched);
        assert_eq!(correlator.on_result(ok(id, "second")), Delivery::Duplicate);

        let session = correlator.close();
        assert_eq!(session.resolved[&id].artifact_ref, "first");
    }

    #[test]
    fn early_result_is_claimed_on_register() {
        let correlator = Correlator::new();
        let id = JobId::new_random();

        assert_eq!(correlator.on_result(ok(id, "early")), Delivery::Buffered);
        assert_eq!(correlator.on_result(ok(id, "again")), Delivery::Duplicate);
        assert_eq!(correlator.register([id]), 1);
        assert_eq!(correlator.remaining(), 0);

        let session = correlator.close();
        assert_eq!(session.resolved[&id].artifact_ref, "early");
        assert_eq!(session.unclaimed, 0);
    }

    #[test]
    fn unknown_ids_are_dropped_at_close() {
        let correlator = Correlator::new();
        let id = JobId::new_random();
        correlator.register([id]);

        assert_eq!(correlator.on_result(ok(JobId::new_random(), "stray")), Delivery::Buffered);
        assert_eq!(correlator.remaining(), 1);

        let session = correlator.close();
        assert!(session.resolved.is_empty());
        assert_eq!(session.unclaimed, 1);
    }

    #[test]
    fn results_after_close_are_discarded() {
        let correlator = Correlator::new();
        let id = JobId::new_random();
        correlator.register([id]);
        let session = correlator.close();
        assert!(session.missing.contains(&id));

        assert_eq!(correlator.on_result(ok(id, "late")), Delivery::Discarded);
        assert_eq!(correlator.register([JobId::new_random()]), 0);
        assert_eq!(correlator.remaining(), 0);
        assert!(correlator.close().resolved.is_empty());
    }

    #[test]
    fn concurrent_deliveries_resolve_each_id_once() {
        let correlator = Arc::new(Correlator::new());
        let ids = ids(64);
        correlator.register(ids.clone());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let correlator = Arc::clone(&correlator);
                let ids = ids.clone();
                std::thread::spawn(move || {
                    ids.into_iter()
                        .filter(|id| correlator.on_result(ok(*id, "x")) == Delivery::Matched)
                        .count()
                })
            })
            .collect();

        let matched: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(matched, 64);
        assert_eq!(correlator.remaining(), 0);
    }
}

//! Bounded-concurrency admission of loads.
//!
//! The [LoadScheduler] only tracks paths.  It never starts anything itself: every method that admits a path returns
//! it, and the caller is responsible for starting the load.
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::LoadPriority;

/// What [LoadScheduler::submit] did with a path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Moved straight into the active set; the caller must start it.
    Started,
    Queued,
    AlreadyActive,
    AlreadyQueued,
}

#[derive(Debug)]
pub struct LoadScheduler {
    max_active: usize,
    active: Vec<Arc<str>>,
    /// In arrival order.
    waiting: Vec<Arc<str>>,
}

impl LoadScheduler {
    pub fn new(max_active: usize) -> LoadScheduler {
        LoadScheduler {
            max_active,
            active: vec![],
            waiting: vec![],
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.active.iter().any(|p| &**p == path)
    }

    pub fn is_waiting(&self, path: &str) -> bool {
        self.waiting.iter().any(|p| &**p == path)
    }

    pub fn is_scheduled(&self, path: &str) -> bool {
        self.is_active(path) || self.is_waiting(path)
    }

    pub fn active(&self) -> impl Iterator<Item = &Arc<str>> {
        self.active.iter()
    }

    pub fn waiting(&self) -> impl Iterator<Item = &Arc<str>> {
        self.waiting.iter()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Start `path` if there is a free slot, otherwise queue it.  Submitting a path which is already active or
    /// queued does nothing.
    pub fn submit(&mut self, path: &Arc<str>) -> Admission {
        if self.is_active(path) {
            return Admission::AlreadyActive;
        }
        if self.is_waiting(path) {
            return Admission::AlreadyQueued;
        }
        if self.active.len() < self.max_active {
            self.active.push(path.clone());
            Admission::Started
        } else {
            self.waiting.push(path.clone());
            Admission::Queued
        }
    }

    /// Submit requests which arrived together, most urgent first.  Requests of equal priority keep their order.
    /// Returns the paths which were started.
    pub fn submit_batch(
        &mut self,
        mut batch: Vec<(Arc<str>, LoadPriority)>,
    ) -> Vec<Arc<str>> {
        // sort_by_key is stable.
        batch.sort_by_key(|(_, priority)| *priority);
        batch
            .into_iter()
            .filter(|(path, _)| self.submit(path) == Admission::Started)
            .map(|(path, _)| path)
            .collect()
    }

    /// A load ended: free its slot and admit whatever should run next.  Returns the paths which were started.
    pub fn finish(
        &mut self,
        path: &str,
        priority_of: impl FnMut(&str) -> LoadPriority,
    ) -> Vec<Arc<str>> {
        self.active.retain(|p| &**p != path);
        self.promote(priority_of)
    }

    /// Take a path out of the waiting set.  Returns whether it was there.
    pub fn withdraw(&mut self, path: &str) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|p| &**p != path);
        before != self.waiting.len()
    }

    /// Fill free slots from the waiting set, most urgent first and earliest arrival on ties.
    pub fn promote(&mut self, mut priority_of: impl FnMut(&str) -> LoadPriority) -> Vec<Arc<str>> {
        let mut started = vec![];
        while self.active.len() < self.max_active {
            // min_by_key returns the first of several equal minimums, which is the earliest arrival.
            let next = self
                .waiting
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| priority_of(p))
                .map(|(i, _)| i);
            let index = match next {
                Some(i) => i,
                None => break,
            };
            let path = self.waiting.remove(index);
            self.active.push(path.clone());
            started.push(path);
        }
        started
    }

    /// Forget everything, e.g. at teardown.
    pub fn clear(&mut self) {
        self.active.clear();
        self.waiting.clear();
    }
}

/// Detects a load which stopped making progress.
///
/// The clock only runs while progress stands still; any change in the reported progress restarts it.  A slow transfer
/// which keeps advancing is therefore never timed out, however long it takes in total.
#[derive(Debug, Copy, Clone)]
pub struct StallWatch {
    last_progress: u64,
    last_advance: Instant,
}

impl StallWatch {
    pub fn new(now: Instant) -> StallWatch {
        StallWatch {
            last_progress: 0,
            last_advance: now,
        }
    }

    /// Feed the latest progress.  Returns true once progress has stood still for `timeout`.
    pub fn observe(&mut self, progress: u64, now: Instant, timeout: Duration) -> bool {
        if progress != self.last_progress {
            self.last_progress = progress;
            self.last_advance = now;
            return false;
        }
        now.saturating_duration_since(self.last_advance) >= timeout
    }

    /// How long progress has been standing still as of `now`.
    pub fn stalled_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_advance)
    }
}

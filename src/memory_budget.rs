//! Resident memory accounting and reclamation.
//!
//! Totals are always re-derived from the records rather than adjusted incrementally, so that they cannot drift from
//! what is actually in memory.
use std::sync::Arc;

use crate::{AssetRecord, RecordState, UnusedList};

#[derive(Debug, Clone)]
pub struct MemoryBudget {
    max_bytes: u64,
    target_bytes: u64,
    total_bytes: u64,
    in_use_bytes: u64,
}

/// The outcome of one [MemoryBudget::reclaim_if_over_budget].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reclaimed {
    pub evicted: Vec<Arc<str>>,
    pub freed_bytes: u64,
}

impl MemoryBudget {
    pub fn new(max_bytes: u64, target_bytes: u64) -> MemoryBudget {
        MemoryBudget {
            max_bytes,
            target_bytes,
            total_bytes: 0,
            in_use_bytes: 0,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn target_bytes(&self) -> u64 {
        self.target_bytes
    }

    /// Everything resident, in use or cached.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Resident records which still have owners.
    pub fn in_use_bytes(&self) -> u64 {
        self.in_use_bytes
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_bytes > self.max_bytes
    }

    /// Recompute both totals from scratch.
    pub fn account_for<'a, T: 'a>(&mut self, records: impl IntoIterator<Item = &'a AssetRecord<T>>) {
        let mut total = 0;
        let mut in_use = 0;
        for r in records {
            if !r.is_resident() {
                continue;
            }
            total += r.size_bytes();
            if r.state() == RecordState::Ready && r.has_owners() {
                in_use += r.size_bytes();
            }
        }
        self.total_bytes = total;
        self.in_use_bytes = in_use;
    }

    /// If over the maximum, evict from `unused` oldest first until the total is at or below the target.
    ///
    /// `evict` unloads one record and returns the bytes it freed, or `None` if the record turned out not to be
    /// evictable (it has owners again), in which case it is simply dropped from the list.  If the list runs dry
    /// before the target is reached the remaining overage is tolerated.
    pub fn reclaim_if_over_budget(
        &mut self,
        unused: &mut UnusedList<str>,
        mut evict: impl FnMut(&Arc<str>) -> Option<u64>,
    ) -> Reclaimed {
        let mut reclaimed = Reclaimed::default();
        if !self.is_over_budget() {
            return reclaimed;
        }

        while self.total_bytes > self.target_bytes {
            let path = match unused.pop_oldest() {
                Some(p) => p,
                None => break,
            };
            if let Some(freed) = evict(&path) {
                self.total_bytes = self.total_bytes.saturating_sub(freed);
                reclaimed.freed_bytes += freed;
                reclaimed.evicted.push(path);
            }
        }
        reclaimed
    }
}

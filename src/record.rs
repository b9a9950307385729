//! The per-path [AssetRecord] and its state machine.
//!
//! ```text
//! Waiting --admit--> Loading --success--> Ready <--owners--> Unused --unload--> Waiting
//!                     |  ^                                     |
//!                     |  +--- retry / reread                   +--request--> Ready
//!                     +--exhausted--> Failed --reload--> Waiting
//! ```
//!
//! Records only hold state; the [crate::AssetCache] decides when each transition happens.
use std::collections::HashSet;
use std::sync::Arc;

use ahash::RandomState;

use crate::{LoadPriority, OwnerId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Not loaded.  Either never requested, queued, or unloaded.
    Waiting,
    Loading,
    /// Loaded and in use.
    Ready,
    /// Loaded, resident, and without owners.  Eligible for eviction.
    Unused,
    /// Retries are exhausted.
    Failed,
}

/// What [AssetRecord::classify] changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Classification {
    Unchanged,
    BecameUnused,
    /// An unused record had owners again without being requested.
    Reinstated,
}

#[derive(Debug)]
pub struct AssetRecord<T> {
    path: Arc<str>,
    /// The owner this record uses for its own dependencies.
    self_owner: OwnerId,
    state: RecordState,
    priority: LoadPriority,
    payload: Option<Arc<T>>,
    size_bytes: u64,
    retry_count: u32,
    reread_count: u32,
    error: Option<String>,
    owners: HashSet<OwnerId, RandomState>,
    /// Set when the record becomes unused; smaller values became unused earlier.
    unused_since: Option<u64>,
    dependencies: Vec<Arc<str>>,
    load_count: u64,
    /// When the last owner left, in release order across the cache.
    release_seq: u64,
}

impl<T> AssetRecord<T> {
    pub(crate) fn new(path: Arc<str>, self_owner: OwnerId) -> AssetRecord<T> {
        AssetRecord {
            path,
            self_owner,
            state: RecordState::Waiting,
            priority: LoadPriority::DownloadOnly,
            payload: None,
            size_bytes: 0,
            retry_count: 0,
            reread_count: 0,
            error: None,
            owners: Default::default(),
            unused_since: None,
            dependencies: vec![],
            load_count: 0,
            release_seq: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn key(&self) -> &Arc<str> {
        &self.path
    }

    pub fn self_owner(&self) -> OwnerId {
        self.self_owner
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn priority(&self) -> LoadPriority {
        self.priority
    }

    /// Resident size in bytes; 0 unless the payload is in memory.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// How many times a load of this record had to be re-run to read back freshly written data.
    pub fn reread_count(&self) -> u32 {
        self.reread_count
    }

    /// The last load error, if the record failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn has_owners(&self) -> bool {
        !self.owners.is_empty()
    }

    pub fn is_owned_by(&self, owner: OwnerId) -> bool {
        self.owners.contains(&owner)
    }

    pub fn unused_since(&self) -> Option<u64> {
        self.unused_since
    }

    pub fn dependencies(&self) -> &[Arc<str>] {
        &self.dependencies
    }

    /// How many loads of this record have completed, over the lifetime of the cache.
    pub fn load_count(&self) -> u64 {
        self.load_count
    }

    /// The payload, but only while the record is ready.
    pub fn payload(&self) -> Option<Arc<T>> {
        match self.state {
            RecordState::Ready => self.payload.clone(),
            _ => None,
        }
    }

    /// Whether the payload is in memory, in use or not.
    pub fn is_resident(&self) -> bool {
        matches!(self.state, RecordState::Ready | RecordState::Unused)
    }

    /// Loading has ended, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            RecordState::Ready | RecordState::Unused | RecordState::Failed
        )
    }

    /// Lower the priority value towards the more urgent end.  Returns whether it changed.
    pub(crate) fn raise_priority(&mut self, priority: LoadPriority) -> bool {
        if priority.is_more_urgent_than(self.priority) {
            self.priority = priority;
            true
        } else {
            false
        }
    }

    pub(crate) fn add_owner(&mut self, owner: OwnerId) -> bool {
        self.owners.insert(owner)
    }

    pub(crate) fn remove_owner(&mut self, owner: OwnerId) -> bool {
        self.owners.remove(&owner)
    }

    pub(crate) fn release_seq(&self) -> u64 {
        self.release_seq
    }

    pub(crate) fn mark_released(&mut self, seq: u64) {
        self.release_seq = seq;
    }

    /// A fresh request arrived for a record which was sitting unused.
    pub(crate) fn reuse(&mut self) {
        if self.state == RecordState::Unused {
            self.state = RecordState::Ready;
            self.unused_since = None;
        }
    }

    pub(crate) fn begin_load(&mut self) {
        self.state = RecordState::Loading;
        self.error = None;
    }

    pub(crate) fn bump_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub(crate) fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    pub(crate) fn bump_reread(&mut self) -> u32 {
        self.reread_count += 1;
        self.reread_count
    }

    pub(crate) fn complete(&mut self, payload: T, size_bytes: u64) {
        self.payload = Some(Arc::new(payload));
        self.size_bytes = size_bytes;
        self.state = RecordState::Ready;
        self.unused_since = None;
        self.error = None;
        self.load_count += 1;
    }

    /// A download-only load finished; nothing is kept in memory.
    pub(crate) fn complete_without_payload(&mut self) {
        self.state = RecordState::Waiting;
        self.error = None;
        self.load_count += 1;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.state = RecordState::Failed;
        self.error = Some(message);
    }

    pub(crate) fn add_dependency(&mut self, path: Arc<str>) -> bool {
        if self.dependencies.contains(&path) {
            return false;
        }
        self.dependencies.push(path);
        true
    }

    /// Re-derive in-use/unused from the owner set.  `next_unused_key` supplies the sort key for records which become
    /// unused, and is advanced when used.
    pub(crate) fn classify(&mut self, next_unused_key: &mut u64) -> Classification {
        match self.state {
            RecordState::Ready if self.owners.is_empty() => {
                self.state = RecordState::Unused;
                self.unused_since = Some(*next_unused_key);
                *next_unused_key += 1;
                Classification::BecameUnused
            }
            RecordState::Unused if !self.owners.is_empty() => {
                self.state = RecordState::Ready;
                self.unused_since = None;
                Classification::Reinstated
            }
            _ => Classification::Unchanged,
        }
    }

    /// Drop the payload and return to `Waiting`, keeping owners, priority and statistics.  Used by manual reloads.
    pub(crate) fn take_payload(&mut self) -> Option<Arc<T>> {
        self.size_bytes = 0;
        self.unused_since = None;
        if self.state != RecordState::Loading {
            self.state = RecordState::Waiting;
        }
        self.payload.take()
    }

    /// Free the payload so that a future request loads from scratch.  Returns the payload and the dependencies, which
    /// the caller must release.
    pub(crate) fn unload(&mut self) -> (Option<Arc<T>>, Vec<Arc<str>>) {
        let payload = self.take_payload();
        self.state = RecordState::Waiting;
        self.priority = LoadPriority::DownloadOnly;
        (payload, std::mem::take(&mut self.dependencies))
    }
}

//! The [AssetCache] drives a [Loader] and a [Decoder], keeping decoded assets resident for as long as somebody owns
//! them and for as long after that as the memory budget allows.
//!
//! Each path has one [AssetRecord] for the lifetime of the cache.  Callers attach themselves to records as owners with
//! [AssetCache::request] and detach with [AssetCache::release]; the cache does everything else from
//! [AssetCache::tick]:
//!
//! - Active loads are polled.  Successes are decoded and become ready; failures are retried up to the configured
//!   bound and then reported through the error callback; loads whose progress stands still for the stall timeout are
//!   failed.
//! - Free load slots are filled from the waiting set, most urgent first.
//! - Ready records without owners become unused.
//! - Resident memory is recomputed, and if it exceeds the maximum, unused records are unloaded oldest first until it
//!   is back at the target.
//!
//! Records are unloaded but never forgotten, so a path that is requested again goes through the loader from scratch
//! with its statistics intact.
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::owner::OwnerIssuer;
use crate::record::Classification;
use crate::*;

type CacheHashMap<V> = std::collections::HashMap<Arc<str>, V, ahash::RandomState>;

type CompleteCallback<T> = Box<dyn FnMut(&AssetRecord<T>) + Send>;
type ErrorCallback = Box<dyn FnMut(&LoadFailure) -> FailureAction + Send>;

/// A load which failed for good, as handed to the error callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: String,
    pub message: String,
    /// Attempts made, including the first.
    pub attempts: u32,
}

impl From<&LoadFailure> for CacheError {
    fn from(f: &LoadFailure) -> CacheError {
        CacheError::TerminalLoadFailure {
            path: f.path.clone(),
            message: f.message.clone(),
        }
    }
}

/// What to do after the error callback has seen a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Reload on the next tick, with a fresh retry budget.
    Reload,
    /// Leave the record failed until [AssetCache::reload] is called, e.g. once the user dismisses an error dialog.
    Hold,
}

/// What one [AssetCache::tick] did.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub completed: usize,
    pub retried: usize,
    pub rereads: usize,
    pub failed: usize,
    pub evicted: usize,
}

#[derive(Debug, Default, Copy, Clone)]
struct Counters {
    completed: u64,
    retries: u64,
    rereads: u64,
    failures: u64,
    evictions: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub records: usize,
    pub resident_records: usize,
    pub total_bytes: u64,
    pub in_use_bytes: u64,
    pub max_bytes: u64,
    pub target_bytes: u64,
    pub active_loads: usize,
    pub waiting_loads: usize,
    pub completed_loads: u64,
    pub retries: u64,
    pub rereads: u64,
    pub failures: u64,
    pub evictions: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const MB: f64 = 1024.0 * 1024.0;
        write!(
            f,
            "Assets: {} records ({} resident), {:.1}MB / {:.1}MB ({:.1}MB in use), {} loading, {} waiting, {} loaded, {} retries, {} failures, {} evictions",
            self.records,
            self.resident_records,
            self.total_bytes as f64 / MB,
            self.max_bytes as f64 / MB,
            self.in_use_bytes as f64 / MB,
            self.active_loads,
            self.waiting_loads,
            self.completed_loads,
            self.retries,
            self.failures,
            self.evictions,
        )
    }
}

struct ActiveLoad {
    handle: Box<dyn LoadHandle>,
    watch: StallWatch,
}

pub struct AssetCache<L: Loader, D: Decoder, C: Clock = SystemClock> {
    config: CacheConfig,
    loader: L,
    decoder: D,
    clock: C,
    records: CacheHashMap<AssetRecord<D::Output>>,
    scheduler: LoadScheduler,
    loads: CacheHashMap<ActiveLoad>,
    unused: UnusedList<str>,
    budget: MemoryBudget,
    retry: RetryPolicy,
    owners: OwnerIssuer,
    next_unused_key: u64,
    next_release_seq: u64,
    /// Failed records whose error callback asked for a reload; handled at the start of the next tick.
    pending_reloads: Vec<Arc<str>>,
    on_complete: Option<CompleteCallback<D::Output>>,
    on_error: ErrorCallback,
    counters: Counters,
}

/// Unload one record if it is evictable, returning the bytes freed, the record's own owner id, and its dependencies.
fn unload_unused<D: Decoder>(
    records: &mut CacheHashMap<AssetRecord<D::Output>>,
    decoder: &D,
    path: &str,
) -> Option<(u64, OwnerId, Vec<Arc<str>>)> {
    let record = records.get_mut(path)?;
    if record.state() != RecordState::Unused || record.has_owners() {
        return None;
    }
    let freed = record.size_bytes();
    let owner = record.self_owner();
    let (payload, dependencies) = record.unload();
    if let Some(p) = payload {
        decoder.unload(&p);
    }
    debug!(path = %path, bytes = freed, "unloaded");
    Some((freed, owner, dependencies))
}

impl<L: Loader, D: Decoder> AssetCache<L, D, SystemClock> {
    pub fn new(loader: L, decoder: D, config: CacheConfig) -> Result<AssetCache<L, D, SystemClock>, CacheError> {
        AssetCache::with_clock(loader, decoder, config, SystemClock)
    }
}

impl<L: Loader, D: Decoder, C: Clock> AssetCache<L, D, C> {
    pub fn with_clock(
        loader: L,
        decoder: D,
        config: CacheConfig,
        clock: C,
    ) -> Result<AssetCache<L, D, C>, CacheError> {
        config.validate()?;
        Ok(AssetCache {
            loader,
            decoder,
            clock,
            records: Default::default(),
            scheduler: LoadScheduler::new(config.max_concurrent_loads),
            loads: Default::default(),
            unused: UnusedList::new(),
            budget: MemoryBudget::new(config.max_memory_bytes, config.target_memory_bytes),
            retry: RetryPolicy::new(config.max_auto_retries),
            owners: Default::default(),
            next_unused_key: 0,
            next_release_seq: 0,
            pending_reloads: vec![],
            on_complete: None,
            on_error: Box::new(|_: &LoadFailure| FailureAction::Hold),
            counters: Default::default(),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Called with every record that finishes loading with a payload.
    pub fn set_on_complete(&mut self, callback: impl FnMut(&AssetRecord<D::Output>) + Send + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    /// Called with every terminal load failure.  By default failures are held until [AssetCache::reload].
    pub fn set_on_error(&mut self, callback: impl FnMut(&LoadFailure) -> FailureAction + Send + 'static) {
        self.on_error = Box::new(callback);
    }

    /// Get a fresh owner id for something that will hold assets.
    pub fn register_owner(&mut self) -> OwnerId {
        self.owners.issue()
    }

    pub fn record(&self, path: &str) -> Option<&AssetRecord<D::Output>> {
        self.records.get(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &AssetRecord<D::Output>> {
        self.records.values()
    }

    pub fn total_bytes(&self) -> u64 {
        self.budget.total_bytes()
    }

    pub fn in_use_bytes(&self) -> u64 {
        self.budget.in_use_bytes()
    }

    pub fn active_loads(&self) -> usize {
        self.scheduler.active_len()
    }

    pub fn waiting_loads(&self) -> usize {
        self.scheduler.waiting_len()
    }

    /// Find the key for a path, creating a waiting record if this is the first time we see it.
    fn intern(&mut self, path: &str) -> Arc<str> {
        if let Some((key, _)) = self.records.get_key_value(path) {
            return key.clone();
        }

        if path.chars().any(char::is_whitespace) {
            warn!(path = %path, "asset path contains whitespace");
        }
        let key: Arc<str> = path.into();
        let owner = self.owners.issue();
        self.records
            .insert(key.clone(), AssetRecord::new(key.clone(), owner));
        key
    }

    fn key_of(&self, path: &str) -> Result<Arc<str>, CacheError> {
        self.records
            .get_key_value(path)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| CacheError::UnknownAsset(path.to_string()))
    }

    /// The record for `path`, created in the waiting state if it doesn't exist.  Nothing is loaded.
    pub fn resolve_or_create(&mut self, path: &str) -> &AssetRecord<D::Output> {
        let key = self.intern(path);
        &self.records[&key]
    }

    /// Attach `owner` to `path` and make sure it is loaded or loading, at `priority` or more urgently.
    ///
    /// A record which failed for good is not retried by a request; use [AssetCache::reload].
    pub fn request(&mut self, path: &str, priority: LoadPriority, owner: OwnerId) -> &AssetRecord<D::Output> {
        let key = self.intern(path);
        self.attach(&key, priority, Some(owner));
        self.schedule(&key);
        self.optimize_memory();
        &self.records[&key]
    }

    /// Request several paths which arrived at the same moment.  They are admitted most urgent first, so that a less
    /// urgent request which happens to come first in the batch does not take a slot from a more urgent one.
    pub fn request_many<'a>(
        &mut self,
        requests: impl IntoIterator<Item = (&'a str, LoadPriority)>,
        owner: OwnerId,
    ) {
        let mut batch = vec![];
        for (path, priority) in requests {
            let key = self.intern(path);
            self.attach(&key, priority, Some(owner));
            let record = &self.records[&key];
            if record.state() == RecordState::Waiting {
                let priority = record.priority();
                batch.push((key, priority));
            }
        }

        let started = self.scheduler.submit_batch(batch);
        self.start_loads(started);
        self.optimize_memory();
    }

    /// Fetch `path` without keeping the result, so that a later request is served from the loader's own storage.
    pub fn prefetch(&mut self, path: &str) -> &AssetRecord<D::Output> {
        let key = self.intern(path);
        self.attach(&key, LoadPriority::DownloadOnly, None);
        self.schedule(&key);
        &self.records[&key]
    }

    /// Make `child` a dependency of `parent`: it is requested on the parent's behalf, at the parent's priority, and
    /// released when the parent is unloaded.
    ///
    /// A record may not depend on itself, directly or through other dependencies: it would own itself and never leave
    /// memory.
    pub fn add_dependency(&mut self, parent: &str, child: &str) -> Result<&AssetRecord<D::Output>, CacheError> {
        let parent_key = self.key_of(parent)?;
        if self.depends_on(child, parent) {
            return Err(CacheError::Configuration(format!(
                "{} cannot depend on {}: it would depend on itself",
                parent, child
            )));
        }
        let (owner, priority) = {
            let r = &self.records[&parent_key];
            (r.self_owner(), r.priority())
        };

        let child_key = self.intern(child);
        if let Some(r) = self.records.get_mut(&parent_key) {
            r.add_dependency(child_key.clone());
        }
        self.attach(&child_key, priority, Some(owner));
        self.schedule(&child_key);
        self.account();
        Ok(&self.records[&child_key])
    }

    /// Add an owner to an existing record without scheduling anything.
    ///
    /// This is only valid while the record is still in use.  Retaining a record which has already been classified
    /// unused means a handle outlived its release; the record is put back in use, but the mistake is logged and
    /// returned as [CacheError::UseAfterRelease].
    pub fn retain(&mut self, path: &str, owner: OwnerId) -> Result<(), CacheError> {
        let key = self.key_of(path)?;
        let record = match self.records.get_mut(&key) {
            Some(r) => r,
            None => return Err(CacheError::UnknownAsset(path.to_string())),
        };
        record.add_owner(owner);
        let result = if record.classify(&mut self.next_unused_key) == Classification::Reinstated {
            self.unused.remove(&key);
            error!(path = %key, owner = %owner, "owner attached to an asset after it was released");
            Err(CacheError::UseAfterRelease {
                path: key.to_string(),
            })
        } else {
            Ok(())
        };
        self.account();
        result
    }

    /// Detach `owner` from `path`.  Returns whether it was attached; releasing twice is harmless.
    ///
    /// Nothing is evicted here: the record becomes unused on the next tick, and is unloaded only once memory is
    /// needed.
    pub fn release(&mut self, path: &str, owner: OwnerId) -> bool {
        let released = self.release_key(path, owner);
        if released {
            self.account();
        }
        released
    }

    /// Detach `owner` from every record, e.g. when the owning entity is destroyed.  Returns how many records it held.
    pub fn release_owner(&mut self, owner: OwnerId) -> usize {
        let held = self
            .records
            .values()
            .filter(|r| r.is_owned_by(owner))
            .map(|r| r.key().clone())
            .collect::<Vec<_>>();
        for key in &held {
            self.release_key(key, owner);
        }
        if !held.is_empty() {
            self.account();
        }
        held.len()
    }

    fn release_key(&mut self, path: &str, owner: OwnerId) -> bool {
        let record = match self.records.get_mut(path) {
            Some(r) => r,
            None => return false,
        };
        if !record.remove_owner(owner) {
            return false;
        }
        if !record.has_owners() {
            record.mark_released(self.next_release_seq);
            self.next_release_seq += 1;
            debug!(path = %path, "released by last owner");
        }
        true
    }

    /// Restart a load by hand, with a fresh retry budget.  Any resident payload is dropped first.
    pub fn reload(&mut self, path: &str) -> Result<(), CacheError> {
        let key = self.key_of(path)?;
        let record = match self.records.get_mut(&key) {
            Some(r) => r,
            None => return Err(CacheError::UnknownAsset(path.to_string())),
        };
        self.retry.reset(record);
        if self.scheduler.is_scheduled(&key) {
            // Already on its way; the reset budget is all a reload can add.
            return Ok(());
        }

        if let Some(p) = record.take_payload() {
            self.decoder.unload(&p);
        }
        self.unused.remove(&key);
        info!(path = %key, "reloading");
        self.schedule(&key);
        self.account();
        Ok(())
    }

    /// The payload for `path`, if it is ready.
    pub fn get(&self, path: &str) -> Result<Option<Arc<D::Output>>, CacheError> {
        let record = self
            .records
            .get(path)
            .ok_or_else(|| CacheError::UnknownAsset(path.to_string()))?;
        match record.state() {
            RecordState::Failed => Err(CacheError::TerminalLoadFailure {
                path: path.to_string(),
                message: record.error().unwrap_or_default().to_string(),
            }),
            _ => Ok(record.payload()),
        }
    }

    /// Whether `path` is ready and every asset it depends on, directly or not, has finished loading.
    pub fn is_ready(&self, path: &str) -> bool {
        match self.records.get(path) {
            Some(r) if r.state() == RecordState::Ready => {}
            _ => return false,
        }

        let mut seen = HashSet::new();
        let mut stack = vec![path];
        while let Some(p) = stack.pop() {
            if !seen.insert(p) {
                continue;
            }
            let record = match self.records.get(p) {
                Some(r) => r,
                None => return false,
            };
            if !record.is_finished() {
                return false;
            }
            stack.extend(record.dependencies().iter().map(|d| &**d));
        }
        true
    }

    /// Whether `target` is `path` or is reachable from it through dependencies.
    fn depends_on(&self, path: &str, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![path];
        while let Some(p) = stack.pop() {
            if p == target {
                return true;
            }
            if !seen.insert(p) {
                continue;
            }
            if let Some(r) = self.records.get(p) {
                stack.extend(r.dependencies().iter().map(|d| &**d));
            }
        }
        false
    }

    /// Scheduled loads which haven't finished, plus failed records with a reload queued for the next tick.
    fn unfinished_at_or_above(&self, max_priority: LoadPriority) -> impl Iterator<Item = &AssetRecord<D::Output>> {
        let scheduled = self
            .scheduler
            .active()
            .chain(self.scheduler.waiting())
            .filter_map(move |key| self.records.get(key))
            .filter(|r| !r.is_finished());
        let reloading = self
            .pending_reloads
            .iter()
            .filter_map(move |key| self.records.get(key))
            .filter(|r| r.state() == RecordState::Failed);
        scheduled
            .chain(reloading)
            .filter(move |r| r.priority() <= max_priority)
    }

    /// True once every scheduled load at `max_priority` or more urgent has finished, successfully or not.  A failure
    /// whose reload is queued for the next tick is not finished.
    pub fn is_load_complete(&self, max_priority: LoadPriority) -> bool {
        self.unfinished_at_or_above(max_priority).next().is_none()
    }

    /// How many scheduled loads at `max_priority` or more urgent are unfinished.
    pub fn count_loading(&self, max_priority: LoadPriority) -> usize {
        self.unfinished_at_or_above(max_priority).count()
    }

    /// Advance the cache by one step.  Must be called regularly, typically once per frame.
    pub fn tick(&mut self) -> TickReport {
        let before = self.counters;

        for key in std::mem::take(&mut self.pending_reloads) {
            if let Err(e) = self.reload(&key) {
                warn!(path = %key, error = %e, "deferred reload failed");
            }
        }
        self.poll_loads();
        self.promote();
        self.refresh_unused();
        self.optimize_memory();

        let after = self.counters;
        TickReport {
            completed: (after.completed - before.completed) as usize,
            retried: (after.retries - before.retries) as usize,
            rereads: (after.rereads - before.rereads) as usize,
            failed: (after.failures - before.failures) as usize,
            evicted: (after.evictions - before.evictions) as usize,
        }
    }

    /// Unload every unused record, whatever the budget says.  Returns how many were unloaded.
    pub fn clear_unused(&mut self) -> usize {
        let mut count = 0;
        while let Some(key) = self.unused.pop_oldest() {
            if let Some((_, owner, dependencies)) = unload_unused(&mut self.records, &self.decoder, &key) {
                count += 1;
                for d in dependencies {
                    self.release_key(&d, owner);
                }
            }
        }
        self.counters.evictions += count as u64;
        self.account();
        info!(count, "cleared unused assets");
        count
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            records: self.records.len(),
            resident_records: self.records.values().filter(|r| r.is_resident()).count(),
            total_bytes: self.budget.total_bytes(),
            in_use_bytes: self.budget.in_use_bytes(),
            max_bytes: self.budget.max_bytes(),
            target_bytes: self.budget.target_bytes(),
            active_loads: self.scheduler.active_len(),
            waiting_loads: self.scheduler.waiting_len(),
            completed_loads: self.counters.completed,
            retries: self.counters.retries,
            rereads: self.counters.rereads,
            failures: self.counters.failures,
            evictions: self.counters.evictions,
        }
    }

    /// Add an owner and raise the priority.  A record sitting unused which gets a new owner is back in use.
    fn attach(&mut self, key: &Arc<str>, priority: LoadPriority, owner: Option<OwnerId>) {
        let record = match self.records.get_mut(key) {
            Some(r) => r,
            None => return,
        };
        if let Some(owner) = owner {
            record.add_owner(owner);
            if record.state() == RecordState::Unused {
                record.reuse();
                self.unused.remove(key);
            }
        }
        if record.raise_priority(priority) {
            if let Some(load) = self.loads.get_mut(key) {
                load.handle.set_priority(record.priority());
            }
        }
    }

    /// Hand a waiting record to the scheduler, starting it if a slot is free.
    fn schedule(&mut self, key: &Arc<str>) {
        match self.records.get(key) {
            Some(r) if r.state() == RecordState::Waiting => {}
            _ => return,
        }
        if self.scheduler.submit(key) == Admission::Started {
            self.start_loads(vec![key.clone()]);
        }
    }

    /// Start loads for records the scheduler has admitted, in order.
    ///
    /// A loader may refuse a start outright.  The failure is handled here, and whatever it retries or admits into the
    /// freed slot is pushed back onto the same worklist.
    fn start_loads(&mut self, admitted: Vec<Arc<str>>) {
        let mut work = admitted;
        work.reverse();
        while let Some(key) = work.pop() {
            if let Err(e) = self.try_start(&key) {
                let next = self.fail_attempt(&key, e);
                work.extend(next.into_iter().rev());
            }
        }
    }

    fn try_start(&mut self, key: &Arc<str>) -> Result<(), LoadError> {
        let record = match self.records.get_mut(key) {
            Some(r) => r,
            None => return Ok(()),
        };
        record.begin_load();
        let request = LoadRequest {
            path: key,
            priority: record.priority(),
            attempt: record.retry_count(),
        };
        debug!(path = %key, priority = ?request.priority, attempt = request.attempt, "load started");

        let handle = self.loader.start(&request)?;
        let load = ActiveLoad {
            handle,
            watch: StallWatch::new(self.clock.now()),
        };
        self.loads.insert(key.clone(), load);
        Ok(())
    }

    fn poll_loads(&mut self) {
        let now = self.clock.now();
        let timeout = self.config.stall_timeout;
        let active = self.scheduler.active().cloned().collect::<Vec<_>>();

        for key in active {
            let load = match self.loads.get_mut(&key) {
                Some(l) => l,
                None => continue,
            };
            match load.handle.poll() {
                LoadPoll::Pending { progress } => {
                    if load.watch.observe(progress, now, timeout) {
                        let stalled = load.watch.stalled_for(now);
                        self.handle_failure(&key, LoadError::Stalled(stalled));
                    }
                }
                LoadPoll::Fetched(bytes) => self.handle_fetched(&key, bytes),
                LoadPoll::Reread => self.handle_reread(&key),
                LoadPoll::Failed(e) => self.handle_failure(&key, e),
            }
        }
    }

    fn handle_fetched(&mut self, key: &Arc<str>, bytes: Vec<u8>) {
        let decoded = match self.decoder.decode(key, bytes) {
            Ok(item) => self.decoder.estimate_cost(&item).map(|cost| (item, cost)),
            Err(e) => Err(e),
        };
        let (item, cost) = match decoded {
            Ok(x) => x,
            Err(e) => return self.handle_failure(key, LoadError::Decode(e.to_string())),
        };

        self.loads.remove(key);
        let record = match self.records.get_mut(key) {
            Some(r) => r,
            None => return,
        };
        record.reset_retries();
        if record.priority() == LoadPriority::DownloadOnly && !record.has_owners() {
            self.decoder.unload(&item);
            record.complete_without_payload();
            debug!(path = %key, "download finished");
        } else {
            record.complete(item, cost);
            debug!(path = %key, bytes = cost, "load finished");
            if let Some(cb) = self.on_complete.as_mut() {
                cb(&*record);
            }
        }
        self.counters.completed += 1;
        let next = self.finish_active(key);
        self.start_loads(next);
    }

    fn handle_reread(&mut self, key: &Arc<str>) {
        self.loads.remove(key);
        if let Some(r) = self.records.get_mut(key) {
            let n = r.bump_reread();
            debug!(path = %key, rereads = n, "loading again to read back written data");
        }
        self.counters.rereads += 1;
        self.start_loads(vec![key.clone()]);
    }

    fn handle_failure(&mut self, key: &Arc<str>, err: LoadError) {
        let next = self.fail_attempt(key, err);
        self.start_loads(next);
    }

    /// Record a failed attempt.  Returns the paths to start next: the same path if it is retried, otherwise whatever
    /// the freed slot admits.
    fn fail_attempt(&mut self, key: &Arc<str>, err: LoadError) -> Vec<Arc<str>> {
        // Dropping the handle abandons whatever it was still doing.
        self.loads.remove(key);
        let record = match self.records.get_mut(key) {
            Some(r) => r,
            None => return vec![],
        };

        if self.retry.should_retry(record, &err) {
            warn!(path = %key, retry = record.retry_count(), error = %err, "load failed, retrying");
            self.counters.retries += 1;
            return vec![key.clone()];
        }

        let failure = LoadFailure {
            path: key.to_string(),
            message: err.to_string(),
            attempts: record.retry_count() + 1,
        };
        error!(path = %key, attempts = failure.attempts, error = %err, "load failed");
        record.fail(failure.message.clone());
        self.counters.failures += 1;
        let next = self.finish_active(key);

        if (self.on_error)(&failure) == FailureAction::Reload && !self.pending_reloads.contains(key) {
            self.pending_reloads.push(key.clone());
        }
        next
    }

    /// Free the slot held by `key`.  Returns the paths the scheduler admitted in its place.
    fn finish_active(&mut self, key: &str) -> Vec<Arc<str>> {
        self.loads.remove(key);
        let records = &self.records;
        self.scheduler.finish(key, |p| {
            records
                .get(p)
                .map_or(LoadPriority::DownloadOnly, |r| r.priority())
        })
    }

    fn promote(&mut self) {
        let records = &self.records;
        let started = self.scheduler.promote(|p| {
            records
                .get(p)
                .map_or(LoadPriority::DownloadOnly, |r| r.priority())
        });
        self.start_loads(started);
    }

    /// Move ready records without owners to unused, in the order they were released.
    fn refresh_unused(&mut self) {
        let mut released = self
            .records
            .values()
            .filter(|r| r.state() == RecordState::Ready && !r.has_owners())
            .map(|r| (r.release_seq(), r.key().clone()))
            .collect::<Vec<_>>();
        released.sort();

        for (_, key) in released {
            let record = match self.records.get_mut(&key) {
                Some(r) => r,
                None => continue,
            };
            if record.classify(&mut self.next_unused_key) == Classification::BecameUnused {
                self.unused.push_newest(key);
            }
        }
    }

    fn account(&mut self) {
        self.budget.account_for(self.records.values());
    }

    /// Recompute accounting and, if over budget, unload unused records down to the target.
    fn optimize_memory(&mut self) {
        self.account();
        if !self.budget.is_over_budget() {
            return;
        }
        debug!(
            total = self.budget.total_bytes(),
            max = self.budget.max_bytes(),
            target = self.budget.target_bytes(),
            "over memory budget"
        );

        let records = &mut self.records;
        let decoder = &self.decoder;
        let mut released = vec![];
        let reclaimed = self.budget.reclaim_if_over_budget(&mut self.unused, |path| {
            let (freed, owner, dependencies) = unload_unused(records, decoder, path)?;
            released.extend(dependencies.into_iter().map(|d| (d, owner)));
            Some(freed)
        });
        for (dependency, owner) in released {
            self.release_key(&dependency, owner);
        }
        self.counters.evictions += reclaimed.evicted.len() as u64;
        self.account();

        if self.budget.total_bytes() > self.budget.target_bytes() {
            warn!(
                total = self.budget.total_bytes(),
                in_use = self.budget.in_use_bytes(),
                target = self.budget.target_bytes(),
                "memory target unreachable, remaining assets are in use"
            );
        }
    }
}

impl<L: Loader, D: Decoder, C: Clock> Drop for AssetCache<L, D, C> {
    fn drop(&mut self) {
        // Abandon in-flight loads before letting go of payloads.
        self.loads.clear();
        self.scheduler.clear();
        self.unused.clear();
        for record in self.records.values_mut() {
            if let (Some(p), _) = record.unload() {
                self.decoder.unload(&p);
            }
        }
    }
}

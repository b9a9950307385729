//! The [Loader] trait is responsible for turning string keys into bytes, possibly slowly and on another thread.
//!
//! The cache starts a load through the [Loader], then polls the returned [LoadHandle] once per tick until it reports
//! an outcome.  The bytes are handed to a [Decoder], which produces the payload kept in memory and says how much that
//! payload costs.
use std::time::Instant;

use crate::{LoadError, LoadPriority};

/// Everything a loader is told about one attempt.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub path: &'a str,
    pub priority: LoadPriority,
    /// 0 for the first attempt, incremented for each automatic retry.
    pub attempt: u32,
}

/// Start fetching a path.
pub trait Loader {
    /// Begin a load.  Errors returned here are treated exactly like a handle reporting [LoadPoll::Failed].
    fn start(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadHandle>, LoadError>;
}

/// One in-flight load.
///
/// Handles are dropped when the cache no longer wants the result (stall timeout, teardown).  Implementations must
/// tolerate that at any point, and should stop any background work they can.
pub trait LoadHandle: Send {
    fn poll(&mut self) -> LoadPoll;

    /// The record's priority was raised while this load was running.
    fn set_priority(&mut self, _priority: LoadPriority) {}
}

#[derive(Debug)]
pub enum LoadPoll {
    /// Still running.  `progress` is any monotonically increasing measure of work done, such as bytes received; if it
    /// stops changing for the stall timeout the load is failed.
    Pending { progress: u64 },
    Fetched(Vec<u8>),
    /// The loader wrote what it fetched to its own storage and the load must run again to read it back.
    Reread,
    Failed(LoadError),
}

/// A `Decoder` knows how to get from fetched bytes to a decoded representation in memory.
///
/// The output type must be sync in order to enable the cache to store elements behind `Arc`.
pub trait Decoder {
    type Output: Send + Sync;
    type Error: std::error::Error;

    fn decode(&self, path: &str, bytes: Vec<u8>) -> Result<Self::Output, Self::Error>;

    /// Estimate the cost of a decoded item, usually the in-memory size.
    fn estimate_cost(&self, item: &Self::Output) -> Result<u64, Self::Error>;

    /// Called when the cache lets go of a payload.  Callers may still hold `Arc`s to it.
    fn unload(&self, _item: &Self::Output) {}
}

/// A monotonic time source, used for stall timeouts.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

//! A streaming cache for named assets which are loaded asynchronously and kept resident under a memory budget.
//!
//! Games and similar applications ask for the same few hundred files over and over: backgrounds, voices, scripts.
//! Fetching them is slow (network, disk, decryption), holding all of them is too expensive, and several parts of the
//! program usually want the same file at the same time.  The [AssetCache] sits between those callers and the storage:
//!
//! - Every path gets one [AssetRecord], created lazily on first request and kept for the lifetime of the cache.
//! - Callers register as owners of a record with [AssetCache::request] and drop out with [AssetCache::release].  A
//!   record with owners is never evicted.
//! - Loads are driven through a [Loader] by a [LoadScheduler] which never runs more than a configured number at once,
//!   and which admits waiting loads most urgent [LoadPriority] first.
//! - Failures are retried up to a bound by the [RetryPolicy]; a load which stops making progress for too long counts
//!   as a failure.
//! - Loaded records which lose all of their owners become unused but stay resident.  When resident memory exceeds the
//!   budget the [MemoryBudget] unloads unused records, oldest first, until it is back under a lower target.
//!
//! Nothing here runs on its own: [AssetCache::tick] must be called once per frame (or from a timer), and all the
//! bookkeeping happens there.  Loaders are free to use threads; they report back only when polled.
//!
//! To use this crate, implement [Loader] (or use [FilesystemLoader] and [LoaderRouter]) and [Decoder] (or use
//! [BytesDecoder]/[TextDecoder]), then construct an [AssetCache] with your chosen [CacheConfig].
mod asset_cache;
mod config;
mod decoders;
mod error;
mod filesystem_loader;
mod memory_budget;
mod owner;
mod priority;
mod record;
mod retry;
mod router;
mod scheduler;
mod traits;
mod unused_list;

#[cfg(test)]
mod testing;

pub use asset_cache::*;
pub use config::*;
pub use decoders::*;
pub use error::*;
pub use filesystem_loader::*;
pub use memory_budget::*;
pub use owner::*;
pub use priority::*;
pub use record::*;
pub use retry::*;
pub use router::*;
pub use scheduler::*;
pub use traits::*;
pub use unused_list::*;

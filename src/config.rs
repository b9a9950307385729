//! Configuration for the [crate::AssetCache].
use std::time::Duration;

use crate::CacheError;

pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 5;
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_TARGET_MEMORY_BYTES: u64 = 32 * 1024 * 1024;
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_AUTO_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct CacheConfig {
    /// How many loads may be in flight at once.
    #[builder(default = "DEFAULT_MAX_CONCURRENT_LOADS")]
    pub max_concurrent_loads: usize,
    /// Resident size in bytes above which unused assets are unloaded.
    #[builder(default = "DEFAULT_MAX_MEMORY_BYTES")]
    pub max_memory_bytes: u64,
    /// Resident size in bytes that unloading aims for.  Must be below `max_memory_bytes`, so that one reclaim does not
    /// leave the cache right at the threshold.
    #[builder(default = "DEFAULT_TARGET_MEMORY_BYTES")]
    pub target_memory_bytes: u64,
    /// A load which reports no progress for this long is failed.  Slow loads which keep advancing are never cut off.
    #[builder(default = "DEFAULT_STALL_TIMEOUT")]
    pub stall_timeout: Duration,
    /// How many times a failed load is retried before the failure is reported.
    #[builder(default = "DEFAULT_MAX_AUTO_RETRIES")]
    pub max_auto_retries: u32,
}

fn check(max_concurrent_loads: usize, max_memory_bytes: u64, target_memory_bytes: u64) -> Result<(), String> {
    if max_concurrent_loads == 0 {
        return Err("max_concurrent_loads must be at least 1".to_string());
    }
    if target_memory_bytes >= max_memory_bytes {
        return Err(format!(
            "target_memory_bytes ({}) must be less than max_memory_bytes ({})",
            target_memory_bytes, max_memory_bytes
        ));
    }
    Ok(())
}

impl CacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check(
            self.max_concurrent_loads.unwrap_or(DEFAULT_MAX_CONCURRENT_LOADS),
            self.max_memory_bytes.unwrap_or(DEFAULT_MAX_MEMORY_BYTES),
            self.target_memory_bytes.unwrap_or(DEFAULT_TARGET_MEMORY_BYTES),
        )
    }
}

impl CacheConfig {
    /// Check a config which was built by hand rather than through [CacheConfigBuilder].
    pub fn validate(&self) -> Result<(), CacheError> {
        check(
            self.max_concurrent_loads,
            self.max_memory_bytes,
            self.target_memory_bytes,
        )
        .map_err(CacheError::Configuration)
    }
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            target_memory_bytes: DEFAULT_TARGET_MEMORY_BYTES,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
        }
    }
}

impl From<CacheConfigBuilderError> for CacheError {
    fn from(e: CacheConfigBuilderError) -> CacheError {
        CacheError::Configuration(e.to_string())
    }
}

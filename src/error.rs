//! Errors.
//!
//! [LoadError] is what a [crate::Loader] or [crate::Decoder] step reports for a single attempt; most of these are
//! contained inside the cache and retried.  [CacheError] is what crosses the boundary back to callers.
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The transport failed, e.g. a dropped connection or a server error.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The load made no progress for the configured stall timeout.
    #[error("no progress for {0:?}")]
    Stalled(Duration),
    /// The bytes arrived but could not be turned into a payload.
    #[error("decode error: {0}")]
    Decode(String),
    /// Nothing can load this path; retrying will not help.
    #[error("cannot load {path}: {reason}")]
    Unsupported { path: String, reason: String },
}

impl LoadError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LoadError::Unsupported { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The load failed and its automatic retries are exhausted.  Use [crate::AssetCache::reload] to try again.
    #[error("failed to load {path}: {message}")]
    TerminalLoadFailure { path: String, message: String },
    /// An owner was attached to a record which had already been classified unused, i.e. a handle was used after it
    /// was released.
    #[error("{path} gained an owner after it was released")]
    UseAfterRelease { path: String },
    #[error("unknown asset {0}")]
    UnknownAsset(String),
    #[error("invalid cache configuration: {0}")]
    Configuration(String),
}

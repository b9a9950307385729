//! Automatic retries of failed loads.
use crate::{AssetRecord, LoadError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_auto_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_auto_retries: u32) -> RetryPolicy {
        RetryPolicy { max_auto_retries }
    }

    pub fn max_auto_retries(&self) -> u32 {
        self.max_auto_retries
    }

    /// Decide whether a failed attempt gets another go.  Consumes one retry from the record when it does.
    ///
    /// With a bound of `n`, failures 1 through `n` are retried and failure `n + 1` is terminal.  Errors which cannot
    /// succeed on retry are terminal immediately and do not touch the counter.
    pub fn should_retry<T>(&self, record: &mut AssetRecord<T>, error: &LoadError) -> bool {
        if !error.is_retryable() {
            return false;
        }
        if record.retry_count() < self.max_auto_retries {
            record.bump_retry();
            true
        } else {
            false
        }
    }

    /// Give the record its full retry budget back, for a manual reload.
    pub fn reset<T>(&self, record: &mut AssetRecord<T>) {
        record.reset_retries();
    }
}

//! Error types for the spider runtime.

use thiserror::Error;

use super::config::MAX_IDLE_POLL_MS;

/// Errors that stop a crawl from starting or running.
///
/// Per-task failures never surface here; they go to `on_error` hooks.
#[derive(Debug, Error)]
pub enum SpiderError {
    /// Item pool size must be at least 1.
    #[error("item pool size must be at least 1, got {0}")]
    InvalidItemPoolSize(usize),

    /// Idle poll interval is outside the accepted range.
    #[error("idle poll interval must be between 1 and {max} ms, got {0}", max = MAX_IDLE_POLL_MS)]
    InvalidPollInterval(u64),

    /// The default HTTP downloader could not be built.
    #[error("failed to build HTTP downloader: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Semaphore was closed unexpectedly.
    #[error("worker semaphore closed unexpectedly")]
    SemaphoreClosed,
}

//! Spider configuration.

use std::time::Duration;

use serde::Deserialize;

use super::error::SpiderError;
use crate::user_agent;

/// Default number of concurrently running tasks.
pub const DEFAULT_POOL_SIZE: usize = 30;

/// Default upper bound on idle waits in the dispatch and item loops.
pub const DEFAULT_IDLE_POLL_MS: u64 = 100;

/// Largest accepted idle poll interval (1 minute).
pub const MAX_IDLE_POLL_MS: u64 = 60_000;

/// Runtime settings for a [`Spider`](super::Spider).
///
/// Deserializable with every field optional:
///
/// ```
/// use crawler_core::spider::SpiderConfig;
///
/// let config: SpiderConfig = serde_json::from_str(r#"{"pool_size": 4, "depth_first": false}"#)?;
/// assert_eq!(config.pool_size, 4);
/// assert!(!config.keep_waiting);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpiderConfig {
    /// Maximum concurrently running tasks; 0 means unbounded.
    pub pool_size: usize,
    /// Maximum concurrently running `on_item` chains.
    pub item_pool_size: usize,
    /// Queue follow-up tasks at the head (depth-first) instead of the tail.
    pub depth_first: bool,
    /// Keep polling for tasks after the queue drains, until shut down.
    pub keep_waiting: bool,
    /// Upper bound in milliseconds on how long an idle loop waits before rechecking.
    pub idle_poll_ms: u64,
    /// User-Agent applied at admission to requests that have none.
    pub user_agent: String,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            item_pool_size: std::thread::available_parallelism().map_or(1, usize::from),
            depth_first: true,
            keep_waiting: false,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            user_agent: user_agent::default_user_agent(),
        }
    }
}

impl SpiderConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SpiderError::InvalidItemPoolSize`] or
    /// [`SpiderError::InvalidPollInterval`].
    pub fn validate(&self) -> Result<(), SpiderError> {
        if self.item_pool_size == 0 {
            return Err(SpiderError::InvalidItemPoolSize(self.item_pool_size));
        }
        if !(1..=MAX_IDLE_POLL_MS).contains(&self.idle_poll_ms) {
            return Err(SpiderError::InvalidPollInterval(self.idle_poll_ms));
        }
        Ok(())
    }

    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpiderConfig::default();
        assert_eq!(config.pool_size, 30);
        assert!(config.item_pool_size >= 1);
        assert!(config.depth_first);
        assert!(!config.keep_waiting);
        assert_eq!(config.idle_poll(), Duration::from_millis(100));
        assert!(config.user_agent.starts_with("crawler/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_is_unbounded_and_valid() {
        let config = SpiderConfig {
            pool_size: 0,
            ..SpiderConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_item_pool() {
        let config = SpiderConfig {
            item_pool_size: 0,
            ..SpiderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SpiderError::InvalidItemPoolSize(0))
        ));
    }

    #[test]
    fn test_validate_rejects_poll_interval_out_of_range() {
        for ms in [0, MAX_IDLE_POLL_MS + 1] {
            let config = SpiderConfig {
                idle_poll_ms: ms,
                ..SpiderConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SpiderError::InvalidPollInterval(v)) if v == ms
            ));
        }
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SpiderConfig =
            serde_json::from_str(r#"{"keep_waiting": true, "user_agent": "bot/1"}"#).unwrap();
        assert!(config.keep_waiting);
        assert_eq!(config.user_agent, "bot/1");
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    }
}

//! Limit rules and their throttling state.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use super::error::LimiterError;
use super::pattern::HostPattern;

/// How matched requests are throttled.
#[derive(Debug)]
enum Throttle {
    None,
    /// Minimum time between the starts of consecutive matched requests.
    Delay {
        delay: Duration,
        last_request: Mutex<Option<Instant>>,
    },
    /// Requests per second; permits are consumed and refilled by the ticker.
    Rate { rate: usize, tokens: Arc<Semaphore> },
    /// Concurrently in-flight matched requests.
    Parallelism { slots: Arc<Semaphore> },
}

/// One ordered limiter rule.
///
/// ```
/// use std::time::Duration;
/// use crawler_core::limiter::LimitRule;
///
/// let polite = LimitRule::glob("*.example.com")?.delay(Duration::from_millis(500));
/// let blocked = LimitRule::regex(r"^ads\.")?.deny();
/// # Ok::<(), crawler_core::limiter::LimiterError>(())
/// ```
#[derive(Debug)]
pub struct LimitRule {
    pattern: HostPattern,
    allow: bool,
    throttle: Throttle,
}

impl LimitRule {
    /// Creates an allowing, unthrottled rule matching hosts by glob.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidPattern`] if the glob is malformed.
    pub fn glob(glob: &str) -> Result<Self, LimiterError> {
        Ok(Self::with_pattern(HostPattern::glob(glob)?))
    }

    /// Creates an allowing, unthrottled rule matching hosts by regex.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidPattern`] if the regex does not compile.
    pub fn regex(pattern: &str) -> Result<Self, LimiterError> {
        Ok(Self::with_pattern(HostPattern::regex(pattern)?))
    }

    fn with_pattern(pattern: HostPattern) -> Self {
        Self {
            pattern,
            allow: true,
            throttle: Throttle::None,
        }
    }

    /// Vetoes matched tasks before they are queued.
    #[must_use]
    pub fn deny(mut self) -> Self {
        self.allow = false;
        self
    }

    /// Spaces matched requests at least `delay` apart. Replaces any other mode.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.throttle = Throttle::Delay {
            delay,
            last_request: Mutex::new(None),
        };
        self
    }

    /// Allows at most `per_second` matched requests per second. Replaces any
    /// other mode; 0 disables throttling.
    #[must_use]
    pub fn rate(mut self, per_second: u32) -> Self {
        let rate = per_second as usize;
        self.throttle = if rate == 0 {
            Throttle::None
        } else {
            Throttle::Rate {
                rate,
                tokens: Arc::new(Semaphore::new(rate)),
            }
        };
        self
    }

    /// Allows at most `max` matched requests in flight. Replaces any other
    /// mode; 0 disables throttling.
    #[must_use]
    pub fn parallelism(mut self, max: u32) -> Self {
        self.throttle = if max == 0 {
            Throttle::None
        } else {
            Throttle::Parallelism {
                slots: Arc::new(Semaphore::new(max as usize)),
            }
        };
        self
    }

    #[must_use]
    pub fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    pub(crate) fn matches(&self, host: &str) -> bool {
        self.pattern.matches(host)
    }

    /// Waits until a matched request may start.
    ///
    /// Returns the concurrency permit for parallelism rules; the slot is
    /// freed when it is dropped.
    pub(crate) async fn throttle(&self, host: &str) -> Option<OwnedSemaphorePermit> {
        match &self.throttle {
            Throttle::None => None,
            Throttle::Delay {
                delay,
                last_request,
            } => {
                let mut last_request = last_request.lock().await;
                if let Some(previous) = *last_request {
                    let elapsed = previous.elapsed();
                    if elapsed < *delay {
                        let wait = delay.saturating_sub(elapsed);
                        debug!(host, rule = self.pattern.as_str(), delay_ms = wait.as_millis(), "applying rule delay");
                        tokio::time::sleep(wait).await;
                    }
                }
                *last_request = Some(Instant::now());
                None
            }
            Throttle::Rate { tokens, .. } => {
                if let Ok(permit) = tokens.acquire().await {
                    permit.forget();
                }
                None
            }
            Throttle::Parallelism { slots } => Arc::clone(slots).acquire_owned().await.ok(),
        }
    }

    /// Token bucket refilled by the limiter ticker, for rate rules.
    pub(crate) fn rate_bucket(&self) -> Option<(Arc<Semaphore>, usize)> {
        match &self.throttle {
            Throttle::Rate { rate, tokens } => Some((Arc::clone(tokens), *rate)),
            _ => None,
        }
    }
}

fn default_allow() -> bool {
    true
}

/// Serializable form of a [`LimitRule`].
///
/// Exactly one of `glob`/`regex` selects the hosts (`glob` wins when both are
/// set) and at most one of `delay_ms`/`rate`/`parallelism` may be non-zero.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitRuleConfig {
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default = "default_allow")]
    pub allow: bool,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub rate: u32,
    #[serde(default)]
    pub parallelism: u32,
}

impl LimitRuleConfig {
    /// Compiles this entry; `index` is its position, used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError`] for a missing or invalid pattern or
    /// conflicting modes.
    pub fn compile(&self, index: usize) -> Result<LimitRule, LimiterError> {
        let mut rule = match (&self.glob, &self.regex) {
            (Some(glob), _) => LimitRule::glob(glob)?,
            (None, Some(regex)) => LimitRule::regex(regex)?,
            (None, None) => return Err(LimiterError::MissingPattern { index }),
        };

        let modes = [self.delay_ms > 0, self.rate > 0, self.parallelism > 0];
        if modes.iter().filter(|set| **set).count() > 1 {
            return Err(LimiterError::ConflictingModes {
                pattern: rule.pattern.as_str().to_string(),
            });
        }

        if self.delay_ms > 0 {
            rule = rule.delay(Duration::from_millis(self.delay_ms));
        } else if self.rate > 0 {
            rule = rule.rate(self.rate);
        } else if self.parallelism > 0 {
            rule = rule.parallelism(self.parallelism);
        }
        if !self.allow {
            rule = rule.deny();
        }
        Ok(rule)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(json: &str) -> LimitRuleConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_config_defaults_to_allow() {
        let rule = config(r#"{"glob": "*.example.com"}"#).compile(0).unwrap();
        assert!(rule.is_allowed());
        assert!(rule.matches("www.example.com"));
        assert!(rule.rate_bucket().is_none());
    }

    #[test]
    fn test_config_missing_pattern() {
        assert!(matches!(
            config(r#"{"delay_ms": 10}"#).compile(3),
            Err(LimiterError::MissingPattern { index: 3 })
        ));
    }

    #[test]
    fn test_config_conflicting_modes() {
        assert!(matches!(
            config(r#"{"regex": "x", "rate": 2, "parallelism": 1}"#).compile(0),
            Err(LimiterError::ConflictingModes { .. })
        ));
    }

    #[test]
    fn test_config_deny_and_rate() {
        let rule = config(r#"{"regex": "^api\\.", "allow": false, "rate": 5}"#)
            .compile(0)
            .unwrap();
        assert!(!rule.is_allowed());
        assert_eq!(rule.rate_bucket().unwrap().1, 5);
    }

    #[test]
    fn test_later_mode_replaces_earlier() {
        let rule = LimitRule::glob("*")
            .unwrap()
            .rate(3)
            .parallelism(2);
        assert!(rule.rate_bucket().is_none());
    }

    #[tokio::test]
    async fn test_delay_spaces_requests() {
        tokio::time::pause();
        let rule = LimitRule::glob("*").unwrap().delay(Duration::from_millis(200));

        let start = Instant::now();
        assert!(rule.throttle("a.com").await.is_none());
        assert_eq!(start.elapsed(), Duration::ZERO);
        rule.throttle("a.com").await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_parallelism_slot_is_held_until_dropped() {
        let rule = LimitRule::glob("*").unwrap().parallelism(1);
        let slot = rule.throttle("a.com").await;
        assert!(slot.is_some());

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), rule.throttle("a.com")).await;
        assert!(blocked.is_err(), "second slot must wait");

        drop(slot);
        let second = tokio::time::timeout(Duration::from_millis(20), rule.throttle("a.com")).await;
        assert!(second.unwrap().is_some());
    }
}

//! Host-based allow/deny lists and request throttling.
//!
//! A [`Limiter`] is an [`Extension`] holding an ordered list of
//! [`LimitRule`]s. For every request the first rule whose pattern matches
//! the host (`host[:port]`, lowercased) decides:
//!
//! - at `on_new_task`: deny rules veto the task before it is queued; hosts
//!   matching no rule are vetoed only when the limiter denies unmatched hosts
//! - at `on_request`: the rule's throttle blocks the worker (never the
//!   dispatch loop) until the request may start
//! - a parallelism slot is held by the task's [`Context`] through its
//!   handlers and freed when the task finishes, or early at `on_error`
//!
//! Rate rules are refilled once per second by a ticker started in `on_start`
//! and stopped in `on_finish` (or when the limiter is dropped).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use crawler_core::limiter::{LimitRule, Limiter};
//! use crawler_core::spider::{Spider, SpiderConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Limiter::new(vec![
//!     LimitRule::glob("*.example.com")?.delay(Duration::from_secs(1)),
//!     LimitRule::glob("api.example.org")?.parallelism(2),
//! ])
//! .deny_unmatched();
//!
//! let mut spider = Spider::new(SpiderConfig::default())?;
//! spider.use_extension(limiter);
//! # Ok(())
//! # }
//! ```

mod error;
mod pattern;
mod rule;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument};
use url::Url;

pub use error::LimiterError;
pub use pattern::HostPattern;
pub use rule::{LimitRule, LimitRuleConfig};

use crate::context::Context;
use crate::hooks::{CrawlError, Extension};
use crate::net::{Request, host_with_port};
use crate::spider::CrawlHandle;
use crate::task::Task;

/// Interval at which rate rules get their quota back.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// A held parallelism slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct ConcurrencySlot {
    _permit: OwnedSemaphorePermit,
}

/// Serializable limiter settings, compiled with [`Limiter::from_config`].
///
/// ```
/// use crawler_core::limiter::{Limiter, LimiterConfig};
///
/// let config: LimiterConfig = serde_json::from_str(r#"{
///     "deny_unmatched": true,
///     "rules": [
///         {"glob": "*.example.com", "delay_ms": 250},
///         {"regex": "^ads\\.", "allow": false}
///     ]
/// }"#)?;
/// let limiter = Limiter::from_config(&config)?;
/// assert_eq!(limiter.rules().len(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Veto hosts that match no rule.
    pub deny_unmatched: bool,
    /// Ordered rules; the first match wins.
    pub rules: Vec<LimitRuleConfig>,
}

/// Rule-based host filter and throttle.
#[derive(Debug)]
pub struct Limiter {
    rules: Vec<LimitRule>,
    deny_unmatched: bool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Limiter {
    /// Creates a limiter that lets unmatched hosts through.
    #[must_use]
    pub fn new(rules: Vec<LimitRule>) -> Self {
        Self {
            rules,
            deny_unmatched: false,
            ticker: Mutex::new(None),
        }
    }

    /// Vetoes hosts that match no rule (allow-list mode).
    #[must_use]
    pub fn deny_unmatched(mut self) -> Self {
        self.deny_unmatched = true;
        self
    }

    /// Compiles a limiter from its serializable form.
    ///
    /// # Errors
    ///
    /// Returns the first [`LimiterError`] among the rules.
    pub fn from_config(config: &LimiterConfig) -> Result<Self, LimiterError> {
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| rule.compile(index))
            .collect::<Result<Vec<_>, _>>()?;
        let limiter = Self::new(rules);
        Ok(if config.deny_unmatched {
            limiter.deny_unmatched()
        } else {
            limiter
        })
    }

    #[must_use]
    pub fn rules(&self) -> &[LimitRule] {
        &self.rules
    }

    fn rule_for(&self, host: &str) -> Option<&LimitRule> {
        self.rules.iter().find(|rule| rule.matches(host))
    }

    /// Returns whether tasks for `url` may be queued.
    #[must_use]
    pub fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = host_with_port(url) else {
            return !self.deny_unmatched;
        };
        self.rule_for(&host)
            .map_or(!self.deny_unmatched, LimitRule::is_allowed)
    }

    /// Waits until a request to `url` may start under its matching rule.
    ///
    /// Returns a slot for parallelism rules; keep it until the response
    /// arrives.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn acquire(&self, url: &Url) -> Option<ConcurrencySlot> {
        let host = host_with_port(url)?;
        let rule = self.rule_for(&host)?;
        let permit = rule.throttle(&host).await?;
        Some(ConcurrencySlot { _permit: permit })
    }

    /// Starts the rate refill ticker if any rule is rate limited.
    ///
    /// Must be called inside a tokio runtime. Calling it again while the
    /// ticker runs has no effect.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let buckets: Vec<_> = self.rules.iter().filter_map(LimitRule::rate_bucket).collect();
        if buckets.is_empty() {
            return;
        }

        debug!(rules = buckets.len(), "starting rate ticker");
        *ticker = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + RATE_WINDOW, RATE_WINDOW);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                for (tokens, rate) in &buckets {
                    let missing = rate.saturating_sub(tokens.available_permits());
                    if missing > 0 {
                        tokens.add_permits(missing);
                    }
                }
            }
        }));
    }

    /// Stops the rate refill ticker.
    pub fn stop(&self) {
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            debug!("stopping rate ticker");
            handle.abort();
        }
    }

    /// Returns whether the rate ticker is running.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Limiter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl Extension for Limiter {
    fn name(&self) -> &'static str {
        "limiter"
    }

    async fn on_start(&self, _crawl: &CrawlHandle) {
        self.start();
    }

    async fn on_new_task(&self, ctx: Option<&Context>, task: Task) -> Option<Task> {
        match task.request().resolve(ctx.and_then(Context::base_url)) {
            Some(url) if !self.is_allowed(&url) => {
                debug!(url = %url, "host not allowed");
                None
            }
            _ => Some(task),
        }
    }

    async fn on_request(&self, ctx: &mut Context, request: Request) -> Option<Request> {
        if let Some(url) = request.url()
            && let Some(slot) = self.acquire(url).await
        {
            ctx.hold(slot);
        }
        Some(request)
    }

    async fn on_error(&self, ctx: &mut Context, _error: &CrawlError) {
        drop(ctx.release::<ConcurrencySlot>());
    }

    async fn on_finish(&self, _crawl: &CrawlHandle) {
        self.stop();
    }
}

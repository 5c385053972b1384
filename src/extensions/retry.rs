//! Retry with exponential backoff for transient failures.
//!
//! Failures are classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - timeouts, connection failures, 408/5xx statuses
//! - [`FailureType::RateLimited`] - HTTP 429; honors `Retry-After`
//! - [`FailureType::Permanent`] - everything else
//!
//! The [`RetryPolicy`] decides whether another attempt is made and how long
//! to wait. The number of retries already made travels in the request meta
//! under [`RETRY_TIMES_KEY`].

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, info, instrument, warn};

use crate::context::Context;
use crate::hooks::{CrawlError, Extension};
use crate::net::{DownloadError, Request};

/// Request meta key holding the number of retries already made.
pub const RETRY_TIMES_KEY: &str = "retry_times";

/// Default maximum retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Statuses retried by default.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resubmit after `delay`.
    Retry {
        /// How long to wait before resubmitting.
        delay: Duration,
        /// Retry number this will be (first retry is 1).
        retry: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry limits and backoff shape.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(retry - 1), max_delay) + jitter
/// ```
///
/// With defaults, delays are approximately: 1s, 2s, 4s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    max_retries: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each retry.
    backoff_multiplier: f32,

    /// Whether to add random jitter.
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier,
            jitter: true,
        }
    }

    /// Creates a policy with a custom retry limit, using defaults for other settings.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Disables random jitter (deterministic delays).
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides whether to retry after `retries_done` retries already failed.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, retries_done: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if retries_done >= self.max_retries {
            debug!(retries_done, "max retries reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let retry = retries_done + 1;
        let delay = self.calculate_delay(retry);
        debug!(retry, delay_ms = delay.as_millis(), "will retry");
        RetryDecision::Retry { delay, retry }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(retry.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter {
            calculate_jitter()
        } else {
            Duration::ZERO
        };
        Duration::from_millis(capped_ms as u64) + jitter
    }
}

/// Random jitter between 0 and [`MAX_JITTER`], so that tasks failing together
/// do not retry in lockstep.
#[allow(clippy::cast_possible_truncation)]
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=MAX_JITTER.as_millis() as u64))
}

/// Classifies a download error for retry decisions.
///
/// | Error        | Type      |
/// |--------------|-----------|
/// | Timeout      | Transient |
/// | Network      | Transient, unless TLS/certificate related |
/// | Other        | Transient |
/// | InvalidUrl   | Permanent |
/// | InvalidProxy | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Timeout { .. } | DownloadError::Other { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::InvalidUrl { .. } | DownloadError::InvalidProxy { .. } => {
            FailureType::Permanent
        }
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut message = error.to_string().to_lowercase();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push(' ');
        message.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    message.contains("certificate")
        || message.contains("tls")
        || message.contains("ssl")
        || message.contains("handshake")
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// ```
/// use std::time::Duration;
/// use crawler_core::extensions::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };
    Some(
        datetime
            .duration_since(std::time::SystemTime::now())
            .map_or(Duration::ZERO, |duration| duration.min(MAX_RETRY_AFTER)),
    )
}

/// Resubmits failed tasks.
///
/// Download errors are retried from `on_error` when transient. Responses
/// with a retryable status are retried from `on_response` and aborted, so
/// the task's handlers only see the response once retries are exhausted.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    policy: RetryPolicy,
    extra_statuses: HashSet<u16>,
}

impl Retry {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            extra_statuses: HashSet::new(),
        }
    }

    /// Also retries responses with these statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.extra_statuses.extend(statuses);
        self
    }

    /// Returns the failure type for a retryable status, `None` otherwise.
    #[must_use]
    pub fn classify_status(&self, status: StatusCode) -> Option<FailureType> {
        let code = status.as_u16();
        if code == StatusCode::TOO_MANY_REQUESTS.as_u16() {
            Some(FailureType::RateLimited)
        } else if RETRYABLE_STATUSES.contains(&code) || self.extra_statuses.contains(&code) {
            Some(FailureType::Transient)
        } else {
            None
        }
    }

    /// Resubmits `request` if the policy allows; returns whether it did.
    ///
    /// The backoff is carried by the resubmitted task, so this task finishes
    /// and frees its pool and host slots right away.
    fn resubmit(
        &self,
        ctx: &mut Context,
        mut request: Request,
        failure_type: FailureType,
        retry_after: Option<Duration>,
    ) -> bool {
        let retries_done = retry_times(&request);
        match self.policy.should_retry(failure_type, retries_done) {
            RetryDecision::Retry { delay, retry } => {
                let delay = retry_after.unwrap_or(delay);
                info!(
                    url = %request.raw_url(),
                    retry,
                    delay_ms = delay.as_millis(),
                    "retrying"
                );
                request.meta_mut().insert(RETRY_TIMES_KEY.to_string(), retry.into());
                ctx.resubmit_after(request, delay);
                true
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(url = %request.raw_url(), reason = %reason, "giving up");
                false
            }
        }
    }
}

/// Number of retries recorded on `request`.
#[must_use]
pub fn retry_times(request: &Request) -> u32 {
    request
        .meta()
        .get(RETRY_TIMES_KEY)
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

#[async_trait]
impl Extension for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn on_response(&self, ctx: &mut Context) {
        let Some(response) = ctx.response() else {
            return;
        };
        let Some(failure_type) = self.classify_status(response.status()) else {
            return;
        };
        let retry_after = if failure_type == FailureType::RateLimited {
            response
                .header(RETRY_AFTER.as_str())
                .and_then(parse_retry_after)
        } else {
            None
        };
        let request = ctx.request().clone();
        if self.resubmit(ctx, request, failure_type, retry_after) {
            ctx.abort();
        }
    }

    async fn on_error(&self, ctx: &mut Context, error: &CrawlError) {
        let CrawlError::Download(error) = error else {
            return;
        };
        let failure_type = classify_error(error);
        self.resubmit(ctx, error.request().clone(), failure_type, None);
    }
}

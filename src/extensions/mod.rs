//! Ready-made extensions.
//!
//! Each one implements only the hook points it needs; register them with
//! [`Spider::use_extension`](crate::spider::Spider::use_extension). The
//! [`Limiter`](crate::limiter::Limiter) lives in its own module.

mod hosts;
mod max_requests;
mod random_ua;
mod referer;
mod retry;
mod url_filter;

pub use hosts::HostFilter;
pub use max_requests::MaxRequests;
pub use random_ua::RandomUserAgent;
pub use referer::Referer;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RETRY_TIMES_KEY, Retry, RetryDecision, RetryPolicy,
    classify_error, parse_retry_after, retry_times,
};
pub use url_filter::UrlFilter;

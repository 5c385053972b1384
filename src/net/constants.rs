//! Constants for the network layer (timeouts, header values).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout for a whole page fetch (60 seconds).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Content type set by [`Request::post_form`](super::Request::post_form).
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Content type set by [`Request::post_json`](super::Request::post_json).
pub const JSON_CONTENT_TYPE: &str = "application/json";

//! Error types for the network layer.
//!
//! Every [`DownloadError`] carries the request that failed so that hooks
//! (e.g. [`Retry`](crate::extensions::Retry)) can resubmit it without losing
//! its identity.

use thiserror::Error;

use super::Request;

/// Errors returned by a [`Downloader`](super::Downloader).
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request target is not an absolute, fetchable URL.
    #[error("invalid URL: {}", .request.raw_url())]
    InvalidUrl {
        /// The request that failed.
        request: Box<Request>,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {}: {source}", .request.raw_url())]
    Network {
        /// The request that failed.
        request: Box<Request>,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {}", .request.raw_url())]
    Timeout {
        /// The request that timed out.
        request: Box<Request>,
    },

    /// The per-request proxy address could not be used.
    #[error("invalid proxy {proxy} for {}: {source}", .request.raw_url())]
    InvalidProxy {
        /// The request that failed.
        request: Box<Request>,
        /// The proxy address as configured on the request.
        proxy: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Failure reported by a custom downloader.
    #[error("download of {} failed: {message}", .request.raw_url())]
    Other {
        /// The request that failed.
        request: Box<Request>,
        /// Human-readable failure description.
        message: String,
    },
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(request: Request) -> Self {
        Self::InvalidUrl {
            request: Box::new(request),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(request: Request, source: reqwest::Error) -> Self {
        Self::Network {
            request: Box::new(request),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(request: Request) -> Self {
        Self::Timeout {
            request: Box::new(request),
        }
    }

    /// Creates an invalid proxy error.
    pub fn invalid_proxy(request: Request, proxy: impl Into<String>, source: reqwest::Error) -> Self {
        Self::InvalidProxy {
            request: Box::new(request),
            proxy: proxy.into(),
            source,
        }
    }

    /// Creates an error for custom downloaders.
    pub fn other(request: Request, message: impl Into<String>) -> Self {
        Self::Other {
            request: Box::new(request),
            message: message.into(),
        }
    }

    /// Classifies a reqwest error into [`Timeout`](Self::Timeout) or
    /// [`Network`](Self::Network).
    pub fn from_reqwest(request: Request, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(request)
        } else {
            Self::network(request, source)
        }
    }

    /// Returns the request that failed.
    #[must_use]
    pub fn request(&self) -> &Request {
        match self {
            Self::InvalidUrl { request }
            | Self::Network { request, .. }
            | Self::Timeout { request }
            | Self::InvalidProxy { request, .. }
            | Self::Other { request, .. } => request,
        }
    }

    /// Consumes the error and returns the request that failed.
    #[must_use]
    pub fn into_request(self) -> Request {
        match self {
            Self::InvalidUrl { request }
            | Self::Network { request, .. }
            | Self::Timeout { request }
            | Self::InvalidProxy { request, .. }
            | Self::Other { request, .. } => *request,
        }
    }
}

/// Errors that can occur while building a [`Request`].
#[derive(Debug, Error)]
pub enum RequestError {
    /// The JSON body could not be serialized.
    #[error("failed to encode JSON body for {url}: {source}")]
    Json {
        /// Target URL of the request being built.
        url: String,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_and_request() {
        let error = DownloadError::timeout(Request::get("https://example.com/slow"));
        let msg = error.to_string();
        assert!(msg.contains("timeout"), "Expected 'timeout' in: {msg}");
        assert!(msg.contains("https://example.com/slow"), "Expected URL in: {msg}");
        assert_eq!(error.request().raw_url(), "https://example.com/slow");
    }

    #[test]
    fn test_invalid_url_display() {
        let error = DownloadError::invalid_url(Request::get("not a url"));
        let msg = error.to_string();
        assert!(msg.contains("invalid URL"), "Expected 'invalid URL' in: {msg}");
        assert!(msg.contains("not a url"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_other_keeps_request_meta() {
        let request = Request::get("https://example.com/").with_meta("k", "v");
        let error = DownloadError::other(request, "mock failure");
        assert!(error.to_string().contains("mock failure"));
        let request = error.into_request();
        assert_eq!(request.meta()["k"], "v");
    }
}

//! Global cap on the number of requests sent.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::context::Context;
use crate::hooks::Extension;
use crate::net::Request;

/// Vetoes every request after the first `max`.
#[derive(Debug)]
pub struct MaxRequests {
    max: usize,
    seen: AtomicUsize,
}

impl MaxRequests {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            seen: AtomicUsize::new(0),
        }
    }

    /// Requests that reached this hook so far, vetoed ones included.
    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extension for MaxRequests {
    fn name(&self) -> &'static str {
        "max_requests"
    }

    async fn on_request(&self, _ctx: &mut Context, request: Request) -> Option<Request> {
        let count = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.max {
            debug!(count, max = self.max, url = %request.raw_url(), "request limit reached");
            return None;
        }
        Some(request)
    }
}

//! Tasks: a request plus the handlers that only run for its response.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::context::Context;
use crate::net::{Meta, Request};

/// Response handler attached to a single task.
///
/// Handlers run after the spider-wide `on_response` hooks and stop at the
/// first one after which [`Context::abort`] was called.
pub type Handler = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// A unit of crawl work.
#[derive(Clone)]
pub struct Task {
    request: Request,
    handlers: Vec<Handler>,
    meta: Meta,
    delay: Option<Duration>,
}

impl Task {
    /// Creates a task with no handlers.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            handlers: Vec::new(),
            meta: Meta::new(),
            delay: None,
        }
    }

    pub(crate) fn from_parts(request: Request, handlers: Vec<Handler>, meta: Meta) -> Self {
        Self {
            request,
            handlers,
            meta,
            delay: None,
        }
    }

    /// Appends a response handler.
    #[must_use]
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Appends an already shared handler.
    #[must_use]
    pub fn with_shared_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Sets a task meta entry, visible to handlers through [`Context::meta`].
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Holds the task back for `delay` before it is admitted.
    ///
    /// The wait happens outside any worker, so it occupies neither a pool slot
    /// nor a host slot. Only follow-up tasks are delayed; seeds and
    /// [`CrawlHandle::add_task`](crate::CrawlHandle::add_task) admit at once.
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay).filter(|delay| !delay.is_zero());
        self
    }

    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub(crate) fn take_delay(&mut self) -> Option<Duration> {
        self.delay.take()
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    #[must_use]
    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    pub(crate) fn into_parts(self) -> (Request, Vec<Handler>, Meta) {
        (self.request, self.handlers, self.meta)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("request", &self.request)
            .field("handlers", &self.handlers.len())
            .field("meta", &self.meta)
            .field("delay", &self.delay)
            .finish()
    }
}

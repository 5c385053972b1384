//! Hook pipeline: the seven lifecycle points user code plugs into.
//!
//! Every hook is an [`Extension`]. Extensions run in registration order and
//! each chain short-circuits as soon as one of them vetoes (returns `None`)
//! or, for `on_response`, aborts the context.
//!
//! | Point          | Receives                    | May                         |
//! |----------------|-----------------------------|-----------------------------|
//! | `on_start`     | crawl handle                | submit tasks                |
//! | `on_new_task`  | parent context, task        | transform or veto the task  |
//! | `on_request`   | context, request            | transform or veto the fetch |
//! | `on_response`  | context                     | abort the task handlers     |
//! | `on_item`      | item                        | transform or consume item   |
//! | `on_error`     | context, error              | observe, resubmit           |
//! | `on_finish`    | crawl handle                | read statistics             |

mod closures;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use crate::context::Context;
use crate::item::Item;
use crate::net::{DownloadError, Request};
use crate::spider::CrawlHandle;
use crate::task::Task;

pub(crate) use closures::{
    OnErrorFn, OnFinishFn, OnItemFn, OnNewTaskFn, OnRequestFn, OnResponseFn, OnStartFn,
};

/// Failure of a single task, as seen by `on_error` hooks.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The downloader failed; the request is attached to the error.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A hook or task handler panicked while processing `url`.
    #[error("handler panicked while processing {url}: {message}")]
    HandlerPanic {
        /// URL of the task being processed.
        url: String,
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl CrawlError {
    /// Creates a handler panic error.
    pub fn handler_panic(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerPanic {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the failed request for download errors.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        match self {
            Self::Download(error) => Some(error.request()),
            Self::HandlerPanic { .. } => None,
        }
    }
}

/// A bundle of hooks. Every method defaults to a pass-through, so an
/// extension only implements the points it cares about.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn on_start(&self, _crawl: &CrawlHandle) {}

    /// Runs for every task before it is queued, seeds included (`ctx` is
    /// `None` for those). Returning `None` drops the task.
    async fn on_new_task(&self, _ctx: Option<&Context>, task: Task) -> Option<Task> {
        Some(task)
    }

    /// Runs just before the fetch. Returning `None` skips the task.
    async fn on_request(&self, _ctx: &mut Context, request: Request) -> Option<Request> {
        Some(request)
    }

    /// Runs after a successful fetch and before the task's own handlers.
    async fn on_response(&self, _ctx: &mut Context) {}

    /// Runs once per item. Returning `None` stops the item here.
    async fn on_item(&self, item: Item) -> Option<Item> {
        Some(item)
    }

    async fn on_error(&self, _ctx: &mut Context, _error: &CrawlError) {}

    async fn on_finish(&self, _crawl: &CrawlHandle) {}
}

/// Lets callers keep a handle on an extension they register (e.g. to read
/// its state after the crawl).
#[async_trait]
impl<T: Extension + ?Sized> Extension for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn on_start(&self, crawl: &CrawlHandle) {
        (**self).on_start(crawl).await;
    }

    async fn on_new_task(&self, ctx: Option<&Context>, task: Task) -> Option<Task> {
        (**self).on_new_task(ctx, task).await
    }

    async fn on_request(&self, ctx: &mut Context, request: Request) -> Option<Request> {
        (**self).on_request(ctx, request).await
    }

    async fn on_response(&self, ctx: &mut Context) {
        (**self).on_response(ctx).await;
    }

    async fn on_item(&self, item: Item) -> Option<Item> {
        (**self).on_item(item).await
    }

    async fn on_error(&self, ctx: &mut Context, error: &CrawlError) {
        (**self).on_error(ctx, error).await;
    }

    async fn on_finish(&self, crawl: &CrawlHandle) {
        (**self).on_finish(crawl).await;
    }
}

/// Registered extensions, frozen once the crawl starts.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    extensions: Vec<Arc<dyn Extension>>,
}

impl Hooks {
    pub(crate) fn push(&mut self, extension: Arc<dyn Extension>) {
        self.extensions.push(extension);
    }

    pub(crate) fn len(&self) -> usize {
        self.extensions.len()
    }

    pub(crate) async fn start(&self, crawl: &CrawlHandle) {
        for ext in &self.extensions {
            ext.on_start(crawl).await;
        }
    }

    pub(crate) async fn new_task(&self, ctx: Option<&Context>, mut task: Task) -> Option<Task> {
        for ext in &self.extensions {
            let Some(next) = ext.on_new_task(ctx, task).await else {
                trace!(extension = ext.name(), "task vetoed");
                return None;
            };
            task = next;
        }
        Some(task)
    }

    pub(crate) async fn request(&self, ctx: &mut Context, mut request: Request) -> Option<Request> {
        for ext in &self.extensions {
            let Some(next) = ext.on_request(ctx, request).await else {
                trace!(extension = ext.name(), "request vetoed");
                return None;
            };
            request = next;
        }
        Some(request)
    }

    pub(crate) async fn response(&self, ctx: &mut Context) {
        for ext in &self.extensions {
            ext.on_response(ctx).await;
            if ctx.is_aborted() {
                trace!(extension = ext.name(), "response aborted");
                return;
            }
        }
    }

    pub(crate) async fn item(&self, mut item: Item) -> Option<Item> {
        for ext in &self.extensions {
            item = ext.on_item(item).await?;
        }
        Some(item)
    }

    pub(crate) async fn error(&self, ctx: &mut Context, error: &CrawlError) {
        for ext in &self.extensions {
            ext.on_error(ctx, error).await;
        }
    }

    pub(crate) async fn finish(&self, crawl: &CrawlHandle) {
        for ext in &self.extensions {
            ext.on_finish(crawl).await;
        }
    }
}

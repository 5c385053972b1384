//! The crawl runtime.
//!
//! A [`Spider`] collects configuration, hooks and seed tasks, then
//! [`run`](Spider::run) drives the crawl until no task is queued or running.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::net::Request;
//! use crawler_core::spider::{Spider, SpiderConfig};
//! use crawler_core::task::Task;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut spider = Spider::new(SpiderConfig::default())?;
//! spider.on_item(|item| {
//!     if let Some(title) = item.downcast_ref::<String>() {
//!         println!("{title}");
//!     }
//!     None
//! });
//! spider.add_task(Task::new(Request::get("https://example.com/")).with_handler(|ctx| {
//!     let title = ctx.response().map(|r| r.text().len().to_string());
//!     if let Some(title) = title {
//!         ctx.add_item(title);
//!     }
//! }));
//! let stats = spider.run().await?;
//! println!("{} responses", stats.responses_received());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod runtime;
mod stats;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{error, info, instrument};

pub use config::{DEFAULT_IDLE_POLL_MS, DEFAULT_POOL_SIZE, MAX_IDLE_POLL_MS, SpiderConfig};
pub use error::SpiderError;
pub use stats::CrawlStats;

use crate::context::Context;
use crate::hooks::{
    CrawlError, Extension, Hooks, OnErrorFn, OnFinishFn, OnItemFn, OnNewTaskFn, OnRequestFn,
    OnResponseFn, OnStartFn,
};
use crate::item::Item;
use crate::net::{Downloader, HttpDownloader, Request};
use crate::scheduler::{MemoryScheduler, Scheduler};
use crate::task::Task;
use runtime::{Core, dispatch_loop, item_loop, panic_message};

/// A configured crawl, ready to run.
pub struct Spider {
    config: SpiderConfig,
    downloader: Option<Arc<dyn Downloader>>,
    scheduler: Arc<dyn Scheduler>,
    hooks: Hooks,
    seeds: Vec<Task>,
}

impl Spider {
    /// Creates a spider with an in-memory scheduler.
    ///
    /// The HTTP downloader is built when the crawl starts unless one is
    /// supplied with [`with_downloader`](Self::with_downloader).
    ///
    /// # Errors
    ///
    /// Returns [`SpiderError`] if `config` fails validation.
    pub fn new(config: SpiderConfig) -> Result<Self, SpiderError> {
        config.validate()?;
        Ok(Self {
            config,
            downloader: None,
            scheduler: Arc::new(MemoryScheduler::new()),
            hooks: Hooks::default(),
            seeds: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    /// Registers an extension. Extensions run in registration order.
    pub fn use_extension(&mut self, extension: impl Extension + 'static) -> &mut Self {
        self.hooks.push(Arc::new(extension));
        self
    }

    pub fn on_start<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&CrawlHandle) + Send + Sync + 'static,
    {
        self.use_extension(OnStartFn(hook))
    }

    /// Registers a task filter/transform; `ctx` is `None` for seed tasks.
    pub fn on_new_task<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Option<&Context>, Task) -> Option<Task> + Send + Sync + 'static,
    {
        self.use_extension(OnNewTaskFn(hook))
    }

    pub fn on_request<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Context, Request) -> Option<Request> + Send + Sync + 'static,
    {
        self.use_extension(OnRequestFn(hook))
    }

    pub fn on_response<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.use_extension(OnResponseFn(hook))
    }

    pub fn on_item<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Item) -> Option<Item> + Send + Sync + 'static,
    {
        self.use_extension(OnItemFn(hook))
    }

    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Context, &CrawlError) + Send + Sync + 'static,
    {
        self.use_extension(OnErrorFn(hook))
    }

    pub fn on_finish<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&CrawlHandle) + Send + Sync + 'static,
    {
        self.use_extension(OnFinishFn(hook))
    }

    /// Adds a seed task. Seeds are admitted at depth 1 after the `on_start`
    /// hooks ran, in the order they were added.
    pub fn add_task(&mut self, task: Task) -> &mut Self {
        self.seeds.push(task);
        self
    }

    /// Adds a seed task at an explicit depth. A depth of 0 is admitted as 1.
    pub fn add_task_at_depth(&mut self, mut task: Task, depth: u32) -> &mut Self {
        task.request_mut().set_depth(depth);
        self.add_task(task)
    }

    /// Adds a seed task with one task meta entry, visible to its handlers
    /// through [`Context::meta`].
    pub fn add_task_with_meta(
        &mut self,
        task: Task,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.add_task(task.with_meta(key, value))
    }

    /// Runs the crawl to completion.
    ///
    /// 1. `on_start` hooks run, then seeds are admitted
    /// 2. Tasks are dispatched until none is queued or running (or, with
    ///    `keep_waiting`, until [`CrawlHandle::shutdown`] is called on an idle crawl)
    /// 3. `on_finish` hooks run and the remaining items are drained
    ///
    /// Per-task failures are reported to `on_error` hooks and never end the
    /// crawl.
    ///
    /// # Errors
    ///
    /// Returns [`SpiderError::HttpClient`] if no downloader was supplied and
    /// the default one cannot be built.
    #[instrument(skip_all, fields(seeds = self.seeds.len(), extensions = self.hooks.len()))]
    pub async fn run(self) -> Result<Arc<CrawlStats>, SpiderError> {
        let downloader = match self.downloader {
            Some(downloader) => downloader,
            None => Arc::new(HttpDownloader::new().map_err(SpiderError::HttpClient)?),
        };
        let core = Arc::new(Core::new(
            self.config,
            downloader,
            self.scheduler,
            self.hooks,
        ));
        let handle = CrawlHandle {
            core: Arc::clone(&core),
        };

        guarded(&core, "on_start", core.hooks.start(&handle)).await;
        for seed in self.seeds {
            guarded(&core, "seed admission", core.admit(None, seed)).await;
        }

        let items = tokio::spawn(item_loop(Arc::clone(&core)));
        let result = dispatch_loop(&core).await;

        guarded(&core, "on_finish", core.hooks.finish(&handle)).await;
        core.finish_tasks();
        if let Err(e) = items.await {
            error!(error = %e, "item loop failed");
        }
        result?;

        let stats = Arc::clone(&core.stats);
        info!(
            admitted = stats.tasks_admitted(),
            responses = stats.responses_received(),
            failures = stats.download_failures(),
            items = stats.items_produced(),
            "crawl finished"
        );
        Ok(stats)
    }
}

impl fmt::Debug for Spider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spider")
            .field("config", &self.config)
            .field("extensions", &self.hooks.len())
            .field("seeds", &self.seeds.len())
            .finish_non_exhaustive()
    }
}

/// Awaits a lifecycle stage outside any task, logging instead of unwinding.
async fn guarded<F: Future>(core: &Core, stage: &'static str, stage_future: F) {
    if let Err(panic) = AssertUnwindSafe(stage_future).catch_unwind().await {
        core.stats.increment_handler_panics();
        error!(stage, panic = %panic_message(&*panic), "hook panicked");
    }
}

/// Access to a running crawl, given to `on_start` and `on_finish` hooks.
#[derive(Clone)]
pub struct CrawlHandle {
    core: Arc<Core>,
}

impl CrawlHandle {
    /// Submits a top-level task (runs `on_new_task` with no parent).
    ///
    /// Returns `false` if a hook vetoed it.
    pub async fn add_task(&self, task: Task) -> bool {
        self.core.admit(None, task).await
    }

    #[must_use]
    pub fn stats(&self) -> &CrawlStats {
        &self.core.stats
    }

    /// Number of tasks being processed or waiting out an admission delay.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.core.running_tasks()
    }

    /// Ends a `keep_waiting` crawl the next time it is idle.
    pub fn shutdown(&self) {
        self.core.request_shutdown();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}

impl fmt::Debug for CrawlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlHandle")
            .field("running_tasks", &self.running_tasks())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

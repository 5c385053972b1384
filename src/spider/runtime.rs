//! Dispatch loop, per-task workers and the item loop.
//!
//! # Concurrency Model
//!
//! - The dispatch loop takes a pool permit, then a task, and spawns a worker
//! - A worker owns its [`Context`] exclusively and releases its permit when it
//!   has harvested (RAII guard)
//! - Workers and admissions wake the dispatch loop through a [`Notify`]; the
//!   idle poll interval bounds every wait, so an external scheduler that
//!   receives work from elsewhere is still picked up
//! - Tasks delayed with [`Task::after`] wait on a timer outside the pool and
//!   count as running until they are admitted
//! - Items are drained by a separate loop with its own bounded pool

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use reqwest::header::USER_AGENT;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::config::SpiderConfig;
use super::error::SpiderError;
use super::stats::CrawlStats;
use crate::context::Context;
use crate::hooks::{CrawlError, Hooks};
use crate::item::Item;
use crate::net::Downloader;
use crate::scheduler::{Placement, Scheduler};
use crate::task::Task;

/// State shared by the dispatch loop, workers, the item loop and handles.
pub(crate) struct Core {
    pub(crate) config: SpiderConfig,
    pub(crate) downloader: Arc<dyn Downloader>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) hooks: Hooks,
    pub(crate) stats: Arc<CrawlStats>,
    running: AtomicUsize,
    task_notify: Notify,
    item_notify: Notify,
    shutdown: AtomicBool,
    tasks_done: AtomicBool,
}

impl Core {
    pub(crate) fn new(
        config: SpiderConfig,
        downloader: Arc<dyn Downloader>,
        scheduler: Arc<dyn Scheduler>,
        hooks: Hooks,
    ) -> Self {
        Self {
            config,
            downloader,
            scheduler,
            hooks,
            stats: Arc::new(CrawlStats::new()),
            running: AtomicUsize::new(0),
            task_notify: Notify::new(),
            item_notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            tasks_done: AtomicBool::new(false),
        }
    }

    /// Runs a task through `on_new_task`, resolves its depth and URL, and queues it.
    ///
    /// Returns `false` if a hook vetoed the task.
    #[instrument(level = "debug", skip_all, fields(url = %task.request().raw_url()))]
    pub(crate) async fn admit(&self, parent: Option<&Context>, task: Task) -> bool {
        let Some(mut task) = self.hooks.new_task(parent, task).await else {
            self.stats.increment_tasks_vetoed();
            debug!("task vetoed");
            return false;
        };

        let request = task.request_mut();
        // Depths start at 1; an explicit 0 counts as unset.
        if request.depth().is_none_or(|depth| depth == 0) {
            let depth = parent
                .and_then(|ctx| ctx.request().depth())
                .map_or(1, |depth| depth.saturating_add(1));
            request.set_depth(depth);
        }
        if !request.resolve_against(parent.and_then(Context::base_url)) {
            warn!(url = %request.raw_url(), "admitting task with unresolvable URL");
        }
        if !request.headers().contains_key(USER_AGENT) {
            request.set_header(USER_AGENT.as_str(), &self.config.user_agent);
        }

        let placement = Placement::for_order(self.config.depth_first);
        self.scheduler.add_task(task, placement).await;
        self.stats.increment_tasks_admitted();
        self.task_notify.notify_one();
        true
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.task_notify.notify_one();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn running_tasks(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Lets the item loop exit once it has drained.
    pub(crate) fn finish_tasks(&self) {
        self.tasks_done.store(true, Ordering::SeqCst);
        self.item_notify.notify_one();
    }
}

/// Decrements the running count and frees the pool slot when a worker ends.
struct WorkerGuard {
    core: Arc<Core>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.core.running.fetch_sub(1, Ordering::SeqCst);
        self.core.task_notify.notify_one();
    }
}

/// Pulls tasks until the queue is empty and no worker is running.
pub(crate) async fn dispatch_loop(core: &Arc<Core>) -> Result<(), SpiderError> {
    let pool = (core.config.pool_size > 0).then(|| Arc::new(Semaphore::new(core.config.pool_size)));
    let idle = core.config.idle_poll();

    info!(
        pool_size = core.config.pool_size,
        depth_first = core.config.depth_first,
        "starting dispatch loop"
    );

    loop {
        let permit = match &pool {
            Some(pool) => Some(
                Arc::clone(pool)
                    .acquire_owned()
                    .await
                    .map_err(|_| SpiderError::SemaphoreClosed)?,
            ),
            None => None,
        };

        // Read before polling: a worker that finished, or a handle that
        // submitted and then shut down, before this point has already queued
        // everything it produced.
        let running = core.running.load(Ordering::SeqCst);
        let shutdown = core.is_shutdown();

        if let Some(task) = core.scheduler.get_task().await {
            core.running.fetch_add(1, Ordering::SeqCst);
            let guard = WorkerGuard {
                core: Arc::clone(core),
                permit,
            };
            tokio::spawn(async move {
                run_task(&guard.core, task).await;
                drop(guard);
            });
            continue;
        }
        drop(permit);

        if running == 0 && core.scheduler.is_task_queue_empty().await {
            if !core.config.keep_waiting || shutdown {
                break;
            }
            debug!("queue drained, waiting for more tasks");
        }

        tokio::select! {
            () = core.task_notify.notified() => {}
            () = sleep(idle) => {}
        }
    }

    info!(
        requests = core.stats.requests_sent(),
        failures = core.stats.download_failures(),
        "dispatch loop finished"
    );
    Ok(())
}

/// Processes one task and harvests what it produced.
#[instrument(level = "debug", skip_all, fields(url = %task.request().raw_url(), depth = task.request().depth()))]
async fn run_task(core: &Arc<Core>, task: Task) {
    let mut ctx = Context::new(task);

    match AssertUnwindSafe(process(core, &mut ctx)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => report(core, &mut ctx, error).await,
        Err(panic) => {
            core.stats.increment_handler_panics();
            let error = CrawlError::handler_panic(ctx.request().raw_url(), panic_message(&*panic));
            warn!(error = %error, "task panicked");
            report(core, &mut ctx, error).await;
        }
    }

    if let Err(panic) = AssertUnwindSafe(harvest(core, &mut ctx)).catch_unwind().await {
        core.stats.increment_handler_panics();
        let error = CrawlError::handler_panic(ctx.request().raw_url(), panic_message(&*panic));
        warn!(error = %error, "harvest panicked");
        report(core, &mut ctx, error).await;
    }
}

/// on_request, fetch, on_response, then the task's handlers.
async fn process(core: &Core, ctx: &mut Context) -> Result<(), CrawlError> {
    let request = ctx.request().clone();
    let Some(request) = core.hooks.request(ctx, request).await else {
        core.stats.increment_requests_vetoed();
        debug!("request vetoed");
        return Ok(());
    };
    ctx.set_request(request);

    core.stats.increment_requests_sent();
    let response = match core.downloader.fetch(ctx.request()).await {
        Ok(response) => response,
        Err(error) => {
            core.stats.increment_download_failures();
            warn!(error = %error, "download failed");
            return Err(error.into());
        }
    };
    core.stats.increment_responses_received();
    debug!(status = response.status().as_u16(), "response received");
    ctx.set_response(response);

    core.hooks.response(ctx).await;
    if ctx.is_aborted() {
        return Ok(());
    }
    for handler in ctx.handlers() {
        handler(&mut *ctx);
        if ctx.is_aborted() {
            break;
        }
    }
    Ok(())
}

/// Admits follow-up tasks and stores produced items.
async fn harvest(core: &Arc<Core>, ctx: &mut Context) {
    for mut task in ctx.take_tasks() {
        match task.take_delay() {
            Some(delay) => admit_later(core, task, delay),
            None => {
                core.admit(Some(&*ctx), task).await;
            }
        }
    }

    let items = ctx.take_items();
    if items.is_empty() {
        return;
    }
    for item in items {
        core.stats.increment_items_produced();
        core.scheduler.add_item(item).await;
    }
    core.item_notify.notify_one();
}

/// Admits `task` once `delay` has passed.
///
/// The pending admission counts as running, so the crawl does not end under
/// it, but it holds no pool permit. The task was admitted before, so its
/// depth and URL are already resolved and no parent is needed.
fn admit_later(core: &Arc<Core>, task: Task, delay: Duration) {
    debug!(url = %task.request().raw_url(), delay_ms = delay.as_millis(), "delaying admission");
    core.running.fetch_add(1, Ordering::SeqCst);
    let guard = WorkerGuard {
        core: Arc::clone(core),
        permit: None,
    };
    tokio::spawn(async move {
        sleep(delay).await;
        guard.core.admit(None, task).await;
        drop(guard);
    });
}

/// Runs the `on_error` chain; a panic in there is logged and swallowed.
async fn report(core: &Core, ctx: &mut Context, error: CrawlError) {
    if let Err(panic) = AssertUnwindSafe(core.hooks.error(ctx, &error))
        .catch_unwind()
        .await
    {
        core.stats.increment_handler_panics();
        error!(
            error = %error,
            panic = %panic_message(&*panic),
            "on_error hook panicked"
        );
    }
}

/// Drains items through `on_item` until the crawl is done and nothing is left.
pub(crate) async fn item_loop(core: Arc<Core>) {
    let pool = Arc::new(Semaphore::new(core.config.item_pool_size));
    let idle = core.config.idle_poll();
    let mut workers = JoinSet::new();

    loop {
        while workers.try_join_next().is_some() {}

        let Ok(permit) = Arc::clone(&pool).acquire_owned().await else {
            break;
        };
        if let Some(item) = core.scheduler.get_item().await {
            let core = Arc::clone(&core);
            workers.spawn(async move {
                let _permit = permit;
                process_item(&core, item).await;
            });
            continue;
        }
        drop(permit);

        if core.tasks_done.load(Ordering::SeqCst)
            && workers.is_empty()
            && core.scheduler.is_item_queue_empty().await
        {
            break;
        }

        tokio::select! {
            () = core.item_notify.notified() => {}
            () = sleep(idle) => {}
            Some(_) = workers.join_next(), if !workers.is_empty() => {}
        }
    }

    debug!(
        stored = core.stats.items_stored(),
        dropped = core.stats.items_dropped(),
        "item loop finished"
    );
}

async fn process_item(core: &Core, item: Item) {
    match AssertUnwindSafe(core.hooks.item(item)).catch_unwind().await {
        Ok(Some(_)) => core.stats.increment_items_stored(),
        Ok(None) => core.stats.increment_items_dropped(),
        Err(panic) => {
            core.stats.increment_handler_panics();
            error!(panic = %panic_message(&*panic), "on_item hook panicked");
        }
    }
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

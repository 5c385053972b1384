//! Crawl statistics.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters updated by the runtime while a crawl runs.
///
/// Shared through an `Arc`; readable at any time through
/// [`CrawlHandle::stats`](super::CrawlHandle::stats) and returned by
/// [`Spider::run`](super::Spider::run).
#[derive(Debug, Default)]
pub struct CrawlStats {
    tasks_admitted: AtomicUsize,
    tasks_vetoed: AtomicUsize,
    requests_sent: AtomicUsize,
    requests_vetoed: AtomicUsize,
    responses_received: AtomicUsize,
    download_failures: AtomicUsize,
    handler_panics: AtomicUsize,
    items_produced: AtomicUsize,
    items_stored: AtomicUsize,
    items_dropped: AtomicUsize,
}

impl CrawlStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks that passed `on_new_task` and were queued.
    #[must_use]
    pub fn tasks_admitted(&self) -> usize {
        self.tasks_admitted.load(Ordering::SeqCst)
    }

    /// Tasks dropped by an `on_new_task` hook.
    #[must_use]
    pub fn tasks_vetoed(&self) -> usize {
        self.tasks_vetoed.load(Ordering::SeqCst)
    }

    /// Requests handed to the downloader.
    #[must_use]
    pub fn requests_sent(&self) -> usize {
        self.requests_sent.load(Ordering::SeqCst)
    }

    /// Requests dropped by an `on_request` hook.
    #[must_use]
    pub fn requests_vetoed(&self) -> usize {
        self.requests_vetoed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn responses_received(&self) -> usize {
        self.responses_received.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn download_failures(&self) -> usize {
        self.download_failures.load(Ordering::SeqCst)
    }

    /// Panics caught in hooks, handlers and the harvest phase.
    #[must_use]
    pub fn handler_panics(&self) -> usize {
        self.handler_panics.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn items_produced(&self) -> usize {
        self.items_produced.load(Ordering::SeqCst)
    }

    /// Items that made it through every `on_item` hook.
    #[must_use]
    pub fn items_stored(&self) -> usize {
        self.items_stored.load(Ordering::SeqCst)
    }

    /// Items consumed or dropped by an `on_item` hook.
    #[must_use]
    pub fn items_dropped(&self) -> usize {
        self.items_dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_tasks_admitted(&self) {
        self.tasks_admitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_tasks_vetoed(&self) {
        self.tasks_vetoed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_vetoed(&self) {
        self.requests_vetoed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_received(&self) {
        self.responses_received.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_download_failures(&self) {
        self.download_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_handler_panics(&self) {
        self.handler_panics.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_produced(&self) {
        self.items_produced.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_stored(&self) {
        self.items_stored.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_dropped(&self) {
        self.items_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

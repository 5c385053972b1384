//! In-process downloader that records what the crawl asked for.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{DownloadError, Downloader, Request, Response};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::time::Instant;

/// What a scripted fetch returns.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Fails with a transient download error.
    Fail,
    /// Responds with this status and an empty body.
    Status(u16),
}

/// A fetch the mock served.
#[derive(Debug, Clone)]
pub struct Fetch {
    pub request: Request,
    pub started: Instant,
}

#[derive(Default)]
pub struct MockDownloader {
    latency: Duration,
    pages: HashMap<String, String>,
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fetches: Mutex<Vec<Fetch>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch takes `latency` before it returns.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serves `body` as HTML for `url`; other URLs get an empty 200.
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    /// The next fetches of `url` return these outcomes in order, then 200.
    pub fn with_script(self, url: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), outcomes.into_iter().collect());
        self
    }

    /// Every fetch of `url` fails.
    pub fn failing(self, url: &str) -> Self {
        self.with_script(url, std::iter::repeat_n(Outcome::Fail, 64))
    }

    pub fn fetches(&self) -> Vec<Fetch> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.fetches()
            .into_iter()
            .map(|fetch| fetch.request.raw_url().to_string())
            .collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.urls().iter().filter(|u| *u == url).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, url: &str) -> Option<Outcome> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, request: &Request) -> Result<Response, DownloadError> {
        self.fetches.lock().unwrap().push(Fetch {
            request: request.clone(),
            started: Instant::now(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let url = request.raw_url().to_string();
        let status = match self.next_outcome(&url) {
            Some(Outcome::Fail) => {
                return Err(DownloadError::other(request.clone(), "mock failure"));
            }
            Some(Outcome::Status(code)) => StatusCode::from_u16(code).unwrap(),
            None => StatusCode::OK,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        let body = self.pages.get(&url).cloned().unwrap_or_default();
        Response::new(request.clone(), status, headers, body)
    }
}

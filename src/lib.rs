//! Crawler Core Library
//!
//! A concurrent web-crawling engine: seed tasks are fetched by a bounded
//! worker pool, user handlers derive follow-up tasks and result items from
//! each response, and the crawl runs until no work is queued or in flight.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`net`] - Request/response model and the [`Downloader`] capability
//! - [`scheduler`] - Task and item storage behind the [`Scheduler`] capability
//! - [`task`], [`context`], [`item`] - Units of work and per-task state
//! - [`hooks`] - The [`Extension`] trait and the seven lifecycle hook points
//! - [`spider`] - Dispatch loop, workers, item draining and statistics
//! - [`limiter`] - Rule-based host allow/deny lists and throttling
//! - [`extensions`] - Ready-made extensions (retry, host filters, ...)
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::{Request, Spider, SpiderConfig, Task};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut spider = Spider::new(SpiderConfig::default())?;
//! let selector = scraper::Selector::parse("a[href]")?;
//! spider.add_task(Task::new(Request::get("https://example.com/")).with_handler(move |ctx| {
//!     let links: Vec<String> = ctx
//!         .response()
//!         .map(|response| {
//!             response
//!                 .html()
//!                 .select(&selector)
//!                 .filter_map(|a| a.value().attr("href"))
//!                 .map(str::to_string)
//!                 .collect()
//!         })
//!         .unwrap_or_default();
//!     for link in links {
//!         ctx.add_item(link);
//!     }
//! }));
//! spider.run().await?;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod extensions;
pub mod hooks;
pub mod item;
pub mod limiter;
pub mod net;
pub mod scheduler;
pub mod spider;
pub mod task;
pub mod user_agent;

// Re-export commonly used types
pub use context::Context;
pub use hooks::{CrawlError, Extension};
pub use item::Item;
pub use limiter::{LimitRule, Limiter, LimiterConfig, LimiterError};
pub use net::{DownloadError, Downloader, HttpDownloader, Meta, Request, Response};
pub use scheduler::{MemoryScheduler, Placement, Scheduler, TaskQueue};
pub use spider::{CrawlHandle, CrawlStats, Spider, SpiderConfig, SpiderError};
pub use task::{Handler, Task};

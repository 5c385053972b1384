//! Request/response model and the downloader capability.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::net::{Downloader, HttpDownloader, Request};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = HttpDownloader::new()?;
//! let response = downloader
//!     .fetch(&Request::get("https://example.com/").with_meta("source", "seed"))
//!     .await?;
//! println!("{} {}", response.status(), response.meta()["source"]);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod request;
mod response;

pub use client::{Downloader, HttpDownloader};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::{DownloadError, RequestError};
pub use request::{Meta, Request, host_with_port};
pub use response::Response;

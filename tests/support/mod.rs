//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod logging;
pub mod mock_downloader;
pub mod socket_guard;

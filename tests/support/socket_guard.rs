//! Skips wiremock tests where localhost sockets cannot be bound (sandboxes).
//!
//! Set `CRAWLER_REQUIRE_SOCKET_TESTS=1` in CI to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "CRAWLER_REQUIRE_SOCKET_TESTS";

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
fn localhost_unavailable() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let caller = Location::caller();
    let message = format!(
        "[socket-bound-test] {}:{} cannot bind a localhost socket",
        caller.file(),
        caller.line()
    );
    assert!(!socket_tests_required(), "{message} and {REQUIRE_ENV} is set");
    eprintln!("{message}; skipping (set {REQUIRE_ENV}=1 to fail instead)");
    true
}

/// Starts a mock server, or returns `None` when the test should be skipped.
#[track_caller]
pub fn mock_server_or_skip() -> Option<impl Future<Output = MockServer>> {
    (!localhost_unavailable()).then(MockServer::start)
}

/// Binds `$server` to a started [`MockServer`] or returns `Ok(())` early.
#[macro_export]
macro_rules! require_mock_server {
    () => {{
        let Some(starting) = $crate::support::socket_guard::mock_server_or_skip() else {
            return Ok(());
        };
        starting.await
    }};
}

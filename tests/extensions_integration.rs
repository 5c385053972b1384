//! Integration tests for the bundled extensions inside a running crawl.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crawler_core::extensions::{
    HostFilter, MaxRequests, RandomUserAgent, Referer, Retry, RetryPolicy, UrlFilter, retry_times,
};
use crawler_core::{Request, Spider, SpiderConfig, Task};
use reqwest::header::{REFERER, USER_AGENT};

mod support;
use support::mock_downloader::{MockDownloader, Outcome};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn spider(mock: &Arc<MockDownloader>) -> Result<Spider, Box<dyn std::error::Error>> {
    let config = SpiderConfig {
        pool_size: 2,
        depth_first: false,
        idle_poll_ms: 5,
        ..SpiderConfig::default()
    };
    Ok(Spider::new(config)?.with_downloader(mock.clone()))
}

fn immediate_retry(max_retries: u32) -> Retry {
    Retry::new(RetryPolicy::new(max_retries, Duration::ZERO, Duration::ZERO, 2.0).without_jitter())
}

#[tokio::test]
async fn test_retry_recovers_from_error_then_bad_status() -> TestResult {
    support::logging::init();
    let url = "https://example.com/flaky";
    let mock = Arc::new(
        MockDownloader::new().with_script(url, [Outcome::Fail, Outcome::Status(503)]),
    );
    let handled = Arc::new(Mutex::new(Vec::new()));

    let mut spider = spider(&mock)?;
    spider.use_extension(immediate_retry(3));
    let record = Arc::clone(&handled);
    spider.add_task(Task::new(Request::get(url)).with_handler(move |ctx| {
        let status = ctx.response().map(|r| r.status().as_u16());
        record
            .lock()
            .unwrap()
            .push((status, retry_times(ctx.request())));
    }));

    let stats = spider.run().await?;

    assert_eq!(mock.count(url), 3);
    assert_eq!(*handled.lock().unwrap(), vec![(Some(200), 2)]);
    assert_eq!(stats.download_failures(), 1);
    Ok(())
}

#[tokio::test]
async fn test_retry_gives_up_after_max_retries() -> TestResult {
    let url = "https://example.com/dead";
    let mock = Arc::new(MockDownloader::new().failing(url));
    let errors = Arc::new(AtomicUsize::new(0));

    let mut spider = spider(&mock)?;
    spider.use_extension(immediate_retry(2));
    let seen = Arc::clone(&errors);
    spider.on_error(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    spider.add_task(Task::new(Request::get(url)).with_handler(|_| panic!("must not run")));

    let stats = spider.run().await?;

    assert_eq!(mock.count(url), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 3);
    assert_eq!(stats.handler_panics(), 0);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_status_retries_reach_handlers() -> TestResult {
    let url = "https://example.com/busy";
    let mock = Arc::new(MockDownloader::new().with_script(
        url,
        [Outcome::Status(503), Outcome::Status(503), Outcome::Status(503)],
    ));
    let handled = Arc::new(Mutex::new(Vec::new()));

    let mut spider = spider(&mock)?;
    spider.use_extension(immediate_retry(1));
    let record = Arc::clone(&handled);
    spider.add_task(Task::new(Request::get(url)).with_handler(move |ctx| {
        let status = ctx.response().map(|r| r.status().as_u16());
        record
            .lock()
            .unwrap()
            .push((status, retry_times(ctx.request())));
    }));

    spider.run().await?;

    assert_eq!(mock.count(url), 2);
    assert_eq!(*handled.lock().unwrap(), vec![(Some(503), 1)]);
    Ok(())
}

#[tokio::test]
async fn test_extra_retry_statuses() -> TestResult {
    let url = "https://example.com/missing-for-now";
    let mock = Arc::new(MockDownloader::new().with_script(url, [Outcome::Status(404)]));

    let mut spider = spider(&mock)?;
    spider.use_extension(immediate_retry(2).with_statuses([404]));
    spider.add_task(Task::new(Request::get(url)));

    spider.run().await?;

    assert_eq!(mock.count(url), 2);
    Ok(())
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() -> TestResult {
    let mock = Arc::new(MockDownloader::new());

    let mut spider = spider(&mock)?;
    spider.use_extension(immediate_retry(3));
    // A seed cannot be resolved, so the downloader rejects it as invalid.
    spider.add_task(Task::new(Request::get("relative/only")));

    let stats = spider.run().await?;

    assert_eq!(mock.count("relative/only"), 1);
    assert_eq!(stats.download_failures(), 1);
    Ok(())
}

#[tokio::test]
async fn test_max_requests_caps_fetches() -> TestResult {
    let mock = Arc::new(MockDownloader::new());
    let limit = Arc::new(MaxRequests::new(2));

    let mut spider = spider(&mock)?;
    spider.use_extension(Arc::clone(&limit));
    for i in 0..5 {
        spider.add_task(Task::new(Request::get(format!("https://example.com/{i}"))));
    }

    let stats = spider.run().await?;

    assert_eq!(mock.urls().len(), 2);
    assert_eq!(stats.requests_vetoed(), 3);
    assert_eq!(limit.seen(), 5);
    Ok(())
}

#[tokio::test]
async fn test_referer_is_set_on_followups() -> TestResult {
    let mock = Arc::new(MockDownloader::new());

    let mut spider = spider(&mock)?;
    spider.use_extension(Referer);
    spider.add_task(Task::new(Request::get("https://example.com/list")).with_handler(|ctx| {
        ctx.new_task(Request::get("item/1"), |_| {});
    }));

    spider.run().await?;

    let fetches = mock.fetches();
    assert_eq!(fetches.len(), 2);
    assert!(fetches[0].request.headers().get(REFERER).is_none());
    assert_eq!(fetches[1].request.raw_url(), "https://example.com/item/1");
    assert_eq!(
        fetches[1].request.headers()[REFERER],
        "https://example.com/list"
    );
    Ok(())
}

#[tokio::test]
async fn test_host_allow_list_drops_offsite_links() -> TestResult {
    let mock = Arc::new(MockDownloader::new());

    let mut spider = spider(&mock)?;
    spider.use_extension(HostFilter::allow(["example.com"]));
    spider.add_task(Task::new(Request::get("https://example.com/")).with_handler(|ctx| {
        ctx.new_task(Request::get("https://other.org/x"), |_| {});
        ctx.new_task(Request::get("/local"), |_| {});
    }));

    let stats = spider.run().await?;

    assert_eq!(
        mock.urls(),
        vec!["https://example.com/", "https://example.com/local"]
    );
    assert_eq!(stats.tasks_vetoed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_host_deny_list_matches_port() -> TestResult {
    let mock = Arc::new(MockDownloader::new());

    let mut spider = spider(&mock)?;
    spider.use_extension(HostFilter::deny(["example.com:8080"]));
    spider.add_task(Task::new(Request::get("http://example.com:8080/admin")));
    spider.add_task(Task::new(Request::get("http://example.com/")));

    spider.run().await?;

    assert_eq!(mock.urls(), vec!["http://example.com/"]);
    Ok(())
}

#[tokio::test]
async fn test_url_filter_keeps_matching_tasks() -> TestResult {
    let mock = Arc::new(MockDownloader::new());

    let mut spider = spider(&mock)?;
    spider.use_extension(UrlFilter::new(r"^https://example\.com/docs/")?);
    spider.add_task(Task::new(Request::get("https://example.com/docs/")).with_handler(|ctx| {
        ctx.new_task(Request::get("guide"), |_| {});
        ctx.new_task(Request::get("/blog/post"), |_| {});
    }));

    spider.run().await?;

    assert_eq!(
        mock.urls(),
        vec!["https://example.com/docs/", "https://example.com/docs/guide"]
    );
    Ok(())
}

#[tokio::test]
async fn test_random_user_agent_overrides_default() -> TestResult {
    let mock = Arc::new(MockDownloader::new());

    let mut spider = spider(&mock)?;
    spider.use_extension(RandomUserAgent::with_agents(["agent-one/1.0"]));
    spider.add_task(Task::new(Request::get("https://example.com/")));

    spider.run().await?;

    let fetches = mock.fetches();
    assert_eq!(fetches[0].request.headers()[USER_AGENT], "agent-one/1.0");
    Ok(())
}

//! Integration tests for host rules running inside a crawl.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crawler_core::extensions::{Retry, RetryPolicy};
use crawler_core::{
    Context, LimitRule, Limiter, LimiterConfig, Request, Spider, SpiderConfig, Task,
};
use tokio::time::Instant;

mod support;
use support::mock_downloader::{MockDownloader, Outcome};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config(pool_size: usize) -> SpiderConfig {
    SpiderConfig {
        pool_size,
        depth_first: false,
        idle_poll_ms: 5,
        ..SpiderConfig::default()
    }
}

fn spider_with(
    mock: &Arc<MockDownloader>,
    limiter: &Arc<Limiter>,
    pool_size: usize,
) -> Result<Spider, Box<dyn std::error::Error>> {
    let mut spider = Spider::new(config(pool_size))?.with_downloader(mock.clone());
    spider.use_extension(Arc::clone(limiter));
    Ok(spider)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallelism_rule_serializes_matching_host() -> TestResult {
    support::logging::init();
    let mock = Arc::new(MockDownloader::new().with_latency(Duration::from_millis(30)));
    let limiter = Arc::new(Limiter::new(vec![
        LimitRule::glob("*.example.com")?.parallelism(1),
    ]));
    let ticks = Arc::new(AtomicUsize::new(0));
    let spans = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let ticks = Arc::clone(&ticks);
        let spans = Arc::clone(&spans);
        move |_: &mut Context| {
            let entered = ticks.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            let left = ticks.fetch_add(1, Ordering::SeqCst);
            spans.lock().unwrap().push((entered, left));
        }
    };
    let mut spider = spider_with(&mock, &limiter, 8)?;
    for i in 0..4 {
        spider.add_task(
            Task::new(Request::get(format!("https://www.example.com/{i}")))
                .with_handler(handler.clone()),
        );
    }

    let stats = tokio::time::timeout(Duration::from_secs(10), spider.run()).await??;

    assert_eq!(stats.responses_received(), 4);
    assert_eq!(mock.max_in_flight(), 1);
    // No other handler ticked while one was running.
    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 4);
    assert!(spans.iter().all(|&(entered, left)| left == entered + 1), "{spans:?}");
    Ok(())
}

#[tokio::test]
async fn test_parallelism_slot_is_freed_on_download_error() -> TestResult {
    let mock = Arc::new(MockDownloader::new().failing("https://www.example.com/bad"));
    let limiter = Arc::new(Limiter::new(vec![
        LimitRule::glob("www.example.com")?.parallelism(1),
    ]));
    let mut spider = spider_with(&mock, &limiter, 4)?;
    spider.add_task(Task::new(Request::get("https://www.example.com/bad")));
    spider.add_task(Task::new(Request::get("https://www.example.com/good")));

    let stats = tokio::time::timeout(Duration::from_secs(10), spider.run()).await??;

    assert_eq!(stats.download_failures(), 1);
    assert_eq!(stats.responses_received(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delay_rule_spaces_requests() -> TestResult {
    let delay = Duration::from_millis(500);
    let mock = Arc::new(MockDownloader::new());
    let limiter = Arc::new(Limiter::new(vec![LimitRule::glob("example.com")?.delay(delay)]));
    let mut spider = spider_with(&mock, &limiter, 4)?;
    for i in 0..3 {
        spider.add_task(Task::new(Request::get(format!("https://example.com/{i}"))));
    }

    spider.run().await?;

    let mut starts: Vec<_> = mock.fetches().into_iter().map(|f| f.started).collect();
    starts.sort();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= delay, "gap {:?}", pair[1] - pair[0]);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rate_rule_refills_each_second() -> TestResult {
    let mock = Arc::new(MockDownloader::new());
    let limiter = Arc::new(Limiter::new(vec![LimitRule::glob("api.example.com")?.rate(2)]));
    let mut spider = spider_with(&mock, &limiter, 8)?;
    for i in 0..5 {
        spider.add_task(Task::new(Request::get(format!("https://api.example.com/{i}"))));
    }

    spider.run().await?;

    let mut starts: Vec<_> = mock.fetches().into_iter().map(|f| f.started).collect();
    starts.sort();
    assert_eq!(starts.len(), 5);
    assert!(starts[2] - starts[0] >= Duration::from_millis(900));
    assert!(starts[4] - starts[0] >= Duration::from_millis(1900));
    assert!(!limiter.is_ticking());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_does_not_hold_the_host_slot() -> TestResult {
    let backoff = Duration::from_secs(2);
    let mock = Arc::new(
        MockDownloader::new().with_script("https://example.com/a", [Outcome::Status(503)]),
    );
    let limiter = Arc::new(Limiter::new(vec![LimitRule::glob("example.com")?.parallelism(1)]));
    let mut spider = Spider::new(config(4))?.with_downloader(mock.clone());
    spider.use_extension(Retry::new(
        RetryPolicy::new(1, backoff, backoff, 2.0).without_jitter(),
    ));
    spider.use_extension(Arc::clone(&limiter));
    spider.add_task(Task::new(Request::get("https://example.com/a")));
    spider.add_task(Task::new(Request::get("https://example.com/b")));

    let began = Instant::now();
    let stats = spider.run().await?;

    let fetches = mock.fetches();
    let started = |url: &str| {
        fetches
            .iter()
            .filter(|f| f.request.raw_url() == url)
            .map(|f| f.started - began)
            .collect::<Vec<_>>()
    };
    let a = started("https://example.com/a");
    let b = started("https://example.com/b");
    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 1);
    assert!(b[0] < backoff, "b waited {:?}", b[0]);
    assert!(a[1] >= backoff, "a retried after {:?}", a[1]);
    assert_eq!(stats.responses_received(), 3);
    Ok(())
}

#[tokio::test]
async fn test_deny_rule_vetoes_tasks_for_host() -> TestResult {
    let mock = Arc::new(MockDownloader::new());
    let limiter = Arc::new(Limiter::new(vec![
        LimitRule::glob("ads.example.com")?.deny(),
    ]));
    let mut spider = spider_with(&mock, &limiter, 2)?;
    spider.add_task(Task::new(Request::get("https://ads.example.com/banner")));
    spider.add_task(Task::new(Request::get("https://www.example.com/")).with_handler(|ctx| {
        ctx.new_task(Request::get("https://ADS.example.com/track"), |_| {});
        ctx.new_task(Request::get("/next"), |_| {});
    }));

    let stats = spider.run().await?;

    assert_eq!(
        mock.urls(),
        vec!["https://www.example.com/", "https://www.example.com/next"]
    );
    assert_eq!(stats.tasks_vetoed(), 2);
    Ok(())
}

#[tokio::test]
async fn test_allow_list_from_config() -> TestResult {
    let config: LimiterConfig = serde_json::from_str(
        r#"{
            "deny_unmatched": true,
            "rules": [
                {"regex": "^docs\\.rs$"},
                {"glob": "*.example.{com,org}", "parallelism": 2}
            ]
        }"#,
    )?;
    let limiter = Arc::new(Limiter::from_config(&config)?);
    let mock = Arc::new(MockDownloader::new());
    let mut spider = spider_with(&mock, &limiter, 4)?;
    for url in [
        "https://docs.rs/",
        "https://www.example.org/",
        "https://elsewhere.net/",
    ] {
        spider.add_task(Task::new(Request::get(url)));
    }

    let stats = spider.run().await?;

    let mut urls = mock.urls();
    urls.sort();
    assert_eq!(urls, vec!["https://docs.rs/", "https://www.example.org/"]);
    assert_eq!(stats.tasks_vetoed(), 1);
    Ok(())
}

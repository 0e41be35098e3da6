//! Integration tests: JSON-lines records → channel → Driver → Replayer →
//! wiremock target.
//!
//! These verify that:
//!
//! 1. Every received line is dispatched exactly once.
//! 2. Failed lines do not stop the run.
//! 3. Concurrency never exceeds the configured bound.
//! 4. Pacing spreads dispatch over time.
//! 5. Cancellation stops dispatch and aborts in-flight attempts.

use replay_core::config::TransportConfig;
use replay_core::{LogLine, OutcomeRecorder, Target};
use replay_engine::{Driver, HttpTransport, Replayer, RunSummary, Transport};
use replay_observability::ReplayStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_driver(server: &MockServer, concurrency: usize) -> (Driver, Arc<ReplayStats>) {
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&TransportConfig::default()).unwrap());
    let stats = Arc::new(ReplayStats::new());
    let recorder: Arc<dyn OutcomeRecorder> = stats.clone();
    let replayer = Arc::new(Replayer::new(transport, recorder));
    let target = Target::parse(&server.uri()).unwrap();
    (Driver::new(replayer, target, concurrency), stats)
}

fn feed(lines: Vec<LogLine>) -> mpsc::Receiver<LogLine> {
    let (tx, rx) = mpsc::channel(lines.len().max(1));
    for line in lines {
        tx.try_send(line).expect("channel sized for all lines");
    }
    rx
}

fn jsonl(urls: &[&str]) -> Vec<LogLine> {
    urls.iter()
        .map(|u| {
            let raw = format!(
                r#"{{"url":"{u}","method":"GET","userAgent":"driver-test","ipclient":"192.0.2.1"}}"#
            );
            serde_json::from_str(&raw).unwrap()
        })
        .collect()
}

// ── Test 1: every line is replayed once ──────────────────────────────────────

#[tokio::test]
async fn driver_replays_every_line_once() {
    let server = MockServer::start().await;
    Mock::given(path("/item"))
        .respond_with(ResponseTemplate::new(200))
        .expect(40)
        .mount(&server)
        .await;

    let (driver, stats) = make_driver(&server, 8);
    let rx = feed(jsonl(&["/item"; 40]));
    let summary = driver.run(rx, CancellationToken::new()).await;

    assert_eq!(
        summary,
        RunSummary { dispatched: 40, completed: 40, errors: 0 }
    );
    assert_eq!(stats.success(), 40);
}

// ── Test 2: errors are counted and the run continues ─────────────────────────

#[tokio::test]
async fn driver_continues_past_failed_lines() {
    let server = MockServer::start().await;
    Mock::given(path("/ok"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let (driver, stats) = make_driver(&server, 2);
    let mut lines = jsonl(&["/ok", "http://%zz", "/gone", "/ok"]);
    lines.push(LogLine::new("/ok", "NOT A METHOD", "ua", "192.0.2.1"));
    let summary = driver.run(feed(lines), CancellationToken::new()).await;

    assert_eq!(summary.dispatched, 5);
    assert_eq!(summary.completed, 5);
    assert_eq!(summary.errors, 2);
    let snap = stats.snapshot();
    assert_eq!(snap.success, 2);
    assert_eq!(snap.failure, 3);
}

// ── Test 3: concurrency bound holds ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn driver_respects_concurrency_bound() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let (driver, stats) = make_driver(&server, 2);
    let started = Instant::now();
    let summary = driver
        .run(feed(jsonl(&["/slow"; 6])), CancellationToken::new())
        .await;

    // 6 lines, 2 at a time, 100ms each.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(summary.completed, 6);
    assert_eq!(stats.success(), 6);
}

// ── Test 4: max_rate paces dispatch ──────────────────────────────────────────

#[tokio::test]
async fn driver_paces_dispatch_with_max_rate() {
    let server = MockServer::start().await;
    Mock::given(path("/paced"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (driver, _stats) = make_driver(&server, 16);
    let driver = driver.with_max_rate(Some(50));
    let started = Instant::now();
    let summary = driver
        .run(feed(jsonl(&["/paced"; 6])), CancellationToken::new())
        .await;

    // First tick is immediate, the remaining five are 20ms apart.
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(summary.dispatched, 6);
}

// ── Test 5: cancellation stops the run ───────────────────────────────────────

#[tokio::test]
async fn driver_stops_on_cancel() {
    let server = MockServer::start().await;
    Mock::given(path("/hang"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let (driver, stats) = make_driver(&server, 4);
    let (tx, rx) = mpsc::channel(16);
    for line in jsonl(&["/hang"; 4]) {
        tx.send(line).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let summary = driver.run(rx, cancel).await;
    drop(tx);

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.dispatched, 4);
    assert_eq!(summary.errors, 4);
    assert_eq!(stats.failure(), 4);
}

#[tokio::test]
async fn driver_with_cancelled_token_dispatches_nothing() {
    let server = MockServer::start().await;
    let (driver, stats) = make_driver(&server, 4);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = driver.run(feed(jsonl(&["/never"; 3])), cancel).await;

    assert_eq!(summary, RunSummary::default());
    assert_eq!(stats.snapshot().completed(), 0);
}

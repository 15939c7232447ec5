//! Dispatcher behaviour against scripted transports.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use blitz_fetch::dispatch::Dispatcher;
use blitz_fetch::error::FetchError;
use blitz_fetch::governor::Governor;
use blitz_fetch::lifecycle::Shutdown;
use blitz_fetch::resilience::{Classifier, RetryPolicy};
use blitz_fetch::sink::{pump, pump_all, MemorySink};
use blitz_fetch::transport::TransportError;
use blitz_fetch::wg::EnvelopeInspector;

mod common;
use common::{fast_config, requests, target, FakeTransport, Reply};

#[tokio::test]
async fn test_every_request_completes_exactly_once() {
    let transport = FakeTransport::ok();
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &fast_config());

    let completions = dispatcher.submit(requests(0..200)).collect().await;

    assert_eq!(completions.len(), 200);
    let keys: HashSet<u64> = completions.iter().map(|c| c.key).collect();
    assert_eq!(keys.len(), 200, "duplicate completion emitted");
    assert!(completions.iter().all(|c| c.is_success() && c.attempts == 1));
    assert_eq!(transport.total_calls(), 200);
}

#[tokio::test]
async fn test_concurrency_never_exceeds_bound() {
    let mut config = fast_config();
    config.governor.max_concurrency = 4;
    let transport = FakeTransport::with_delay(Duration::from_millis(20), |_, _| Reply::Status(200));
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let completions = dispatcher.submit(requests(0..40)).collect().await;

    assert_eq!(completions.len(), 40);
    assert!(transport.peak_in_flight() <= 4, "peak {}", transport.peak_in_flight());
    assert!(transport.peak_in_flight() >= 2);
    assert_eq!(dispatcher.governor().available_slots(), 4);
    assert_eq!(dispatcher.governor().snapshot().in_flight, 0);
}

#[tokio::test]
async fn test_throttled_then_success_within_attempt_budget() {
    let mut config = fast_config();
    config.retry.max_attempts = 4;
    let transport = FakeTransport::new(|_, call| if call <= 3 { Reply::Status(429) } else { Reply::Status(200) });
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let completions = dispatcher.submit(requests(0..5)).collect().await;

    assert_eq!(completions.len(), 5);
    for completion in &completions {
        assert!(completion.is_success(), "{:?}", completion);
        assert_eq!(completion.attempts, 4);
    }
    assert_eq!(dispatcher.stats().summary().throttled, 15);
}

#[tokio::test]
async fn test_retries_exhausted_when_budget_too_small() {
    let mut config = fast_config();
    config.retry.max_attempts = 3;
    let transport = FakeTransport::new(|_, call| if call <= 3 { Reply::Status(429) } else { Reply::Status(200) });
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let completions = dispatcher.submit(requests(0..3)).collect().await;

    assert_eq!(completions.len(), 3);
    for completion in &completions {
        match &completion.outcome {
            Err(FetchError::RetriesExhausted { attempts, .. }) => assert_eq!(*attempts, 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transport.calls_for(&target(completion.key)), 3);
    }
}

#[tokio::test]
async fn test_fatal_status_is_not_retried() {
    let transport = FakeTransport::new(|_, _| Reply::Status(404));
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &fast_config());

    let completions = dispatcher.submit(requests(0..3)).collect().await;

    assert_eq!(completions.len(), 3);
    assert!(completions
        .iter()
        .all(|c| c.outcome == Err(FetchError::HttpStatus { status: 404 }) && c.attempts == 1));
    assert_eq!(transport.total_calls(), 3);
}

#[tokio::test]
async fn test_transient_transport_errors_are_retried() {
    let transport = FakeTransport::new(|_, call| match call {
        1 => Reply::Error(TransportError::Connect("refused".into())),
        2 => Reply::Error(TransportError::Timeout(Duration::from_millis(5))),
        _ => Reply::Status(200),
    });
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &fast_config());

    let completions = dispatcher.submit(requests(0..2)).collect().await;

    assert!(completions.iter().all(|c| c.is_success() && c.attempts == 3));
    // transport failures say nothing about load
    assert_eq!(dispatcher.stats().summary().throttled, 0);
}

#[tokio::test]
async fn test_retry_after_hint_is_honoured() {
    let transport = FakeTransport::new(|_, call| {
        if call == 1 {
            Reply::RetryAfter(429, "0.2")
        } else {
            Reply::Status(200)
        }
    });
    let mut config = fast_config();
    config.retry.max_backoff_ms = 1_000;
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let start = Instant::now();
    let completions = dispatcher.submit(requests(0..1)).collect().await;

    assert!(completions[0].is_success());
    assert!(start.elapsed() >= Duration::from_millis(190), "{:?}", start.elapsed());
}

#[tokio::test]
async fn test_duplicate_keys_are_rejected() {
    let transport = FakeTransport::ok();
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &fast_config());

    let batch = vec![(1u64, target(1)), (2, target(2)), (2, target(2)), (3, target(3))];
    let completions = dispatcher.submit(batch).collect().await;

    let mut keys: Vec<u64> = completions.iter().map(|c| c.key).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 3]);
    assert_eq!(dispatcher.stats().summary().rejected, 1);
    assert_eq!(transport.total_calls(), 3);
}

#[tokio::test]
async fn test_repeated_keys_allowed_when_not_remembered() {
    let mut config = fast_config();
    config.dispatch.reject_duplicate_keys = false;
    config.dispatch.max_outstanding = 1;
    config.governor.max_concurrency = 1;
    let transport = FakeTransport::ok();
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let batch = vec![(1u64, target(1)), (1, target(1)), (2, target(2))];
    let completions = dispatcher.submit(batch).collect().await;

    let mut keys: Vec<u64> = completions.iter().map(|c| c.key).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 1, 2]);
    assert!(completions.iter().all(|c| c.is_success()));
    assert_eq!(dispatcher.stats().summary().rejected, 0);
    assert_eq!(transport.total_calls(), 3);
}

#[tokio::test]
async fn test_panicking_attempt_fails_only_its_request() {
    let transport = FakeTransport::new(|target, _| {
        if target.base().path().ends_with("/1") {
            Reply::Panic("transport blew up")
        } else {
            Reply::Status(200)
        }
    });
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &fast_config());

    let completions = tokio::time::timeout(Duration::from_secs(5), dispatcher.submit(requests(0..3)).collect())
        .await
        .expect("batch hung after a panicking attempt");

    assert_eq!(completions.len(), 3);
    let failed = completions.iter().find(|c| c.key == 1).unwrap();
    assert_eq!(failed.attempts, 1);
    match &failed.outcome {
        Err(FetchError::Internal(message)) => assert!(message.contains("transport blew up")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(completions.iter().filter(|c| c.key != 1).all(|c| c.is_success()));
    assert_eq!(dispatcher.governor().snapshot().in_flight, 0);
}

#[tokio::test]
async fn test_zero_outstanding_limit_still_progresses() {
    let mut config = fast_config();
    config.dispatch.max_outstanding = 0;
    let dispatcher = Dispatcher::new(FakeTransport::ok(), &config);

    let completions = tokio::time::timeout(Duration::from_secs(5), dispatcher.submit(requests(0..3)).collect())
        .await
        .expect("batch stalled with a zero outstanding limit");

    assert_eq!(completions.len(), 3);
    assert!(completions.iter().all(|c| c.is_success()));
}

#[tokio::test]
async fn test_empty_batch_finishes() {
    let dispatcher = Dispatcher::new(FakeTransport::ok(), &fast_config());
    let completions = dispatcher.submit(Vec::<(u64, _)>::new()).collect().await;
    assert!(completions.is_empty());
}

#[tokio::test]
async fn test_source_is_pulled_lazily() {
    let mut config = fast_config();
    config.dispatch.max_outstanding = 8;
    let transport = FakeTransport::with_delay(Duration::from_millis(2), |_, _| Reply::Status(200));
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let batch = dispatcher.submit((0..1_000u64).map(|n| (n, target(n))));
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(batch.progress().outstanding() <= 8);

    let completions = batch.collect().await;
    assert_eq!(completions.len(), 1_000);
}

#[tokio::test]
async fn test_cancellation_resolves_hanging_requests() {
    let mut config = fast_config();
    config.governor.max_concurrency = 100;
    config.transport.timeout_ms = 300;
    let transport = FakeTransport::new(|target, _| {
        let n: u64 = target
            .base()
            .path_segments()
            .and_then(|s| s.last())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        if n < 50 {
            Reply::Hang
        } else {
            Reply::Status(200)
        }
    });
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);

    let batch = dispatcher.submit(requests(0..100));
    tokio::time::sleep(Duration::from_millis(100)).await;
    batch.cancel();

    let completions = tokio::time::timeout(Duration::from_secs(5), batch.collect())
        .await
        .expect("cancelled batch did not finish");

    assert_eq!(completions.len(), 100);
    let cancelled: Vec<u64> = completions.iter().filter(|c| c.is_cancelled()).map(|c| c.key).collect();
    assert_eq!(cancelled.len(), 50);
    assert!(cancelled.iter().all(|&k| k < 50));
    assert_eq!(dispatcher.governor().available_slots(), 100);
}

#[tokio::test]
async fn test_shutdown_cancels_queued_requests() {
    let mut config = fast_config();
    config.governor.max_concurrency = 1;
    let transport = FakeTransport::with_delay(Duration::from_millis(50), |_, _| Reply::Status(200));
    let dispatcher = Dispatcher::new(Arc::clone(&transport), &config);
    let shutdown = Shutdown::new();

    let batch = dispatcher.submit_with_shutdown(requests(0..20), &shutdown);
    tokio::time::sleep(Duration::from_millis(75)).await;
    shutdown.trigger();

    let completions = tokio::time::timeout(Duration::from_secs(5), batch.collect())
        .await
        .expect("batch did not finish after shutdown");

    assert_eq!(completions.len(), 20);
    let succeeded = completions.iter().filter(|c| c.is_success()).count();
    assert!((1..=3).contains(&succeeded), "succeeded {}", succeeded);
    let never_sent = completions.iter().filter(|c| c.is_cancelled() && c.attempts == 0).count();
    assert!(never_sent >= 16);
}

#[tokio::test]
async fn test_rate_falls_to_floor_under_constant_throttling() {
    let mut config = fast_config();
    config.governor.min_rate = 20.0;
    config.governor.initial_rate = 80.0;
    config.governor.max_rate = 100.0;
    config.governor.burst = 10.0;
    config.retry.max_attempts = 1;
    let dispatcher = Dispatcher::new(FakeTransport::new(|_, _| Reply::Status(429)), &config);

    let completions = dispatcher.submit(requests(0..8)).collect().await;

    assert!(completions
        .iter()
        .all(|c| matches!(c.outcome, Err(FetchError::RetriesExhausted { attempts: 1, .. }))));
    let state = dispatcher.governor().snapshot();
    assert_eq!(state.current_rate, 20.0);
    assert_eq!(state.consecutive_throttle_signals, 8);
}

#[tokio::test]
async fn test_rate_climbs_to_cap_under_clean_responses() {
    let mut config = fast_config();
    config.governor.min_rate = 1.0;
    config.governor.initial_rate = 10.0;
    config.governor.max_rate = 40.0;
    config.governor.burst = 30.0;
    config.governor.clean_threshold = 5;
    config.governor.increase_factor = 2.0;
    let dispatcher = Dispatcher::new(FakeTransport::ok(), &config);

    let completions = dispatcher.submit(requests(0..30)).collect().await;

    assert!(completions.iter().all(|c| c.is_success()));
    assert_eq!(dispatcher.governor().current_rate(), 40.0);
}

#[tokio::test]
async fn test_shared_governor_across_dispatchers() {
    let mut config = fast_config();
    config.governor.max_concurrency = 3;
    let governor = Arc::new(Governor::named("shared", config.governor.clone()));
    let transport = FakeTransport::with_delay(Duration::from_millis(10), |_, _| Reply::Status(200));

    let a = Dispatcher::with_governor(Arc::clone(&transport), Arc::clone(&governor), &config);
    let b = Dispatcher::with_governor(Arc::clone(&transport), Arc::clone(&governor), &config);
    let (left, right) = tokio::join!(
        a.submit(requests(0..20)).collect(),
        b.submit(requests(100..120)).collect()
    );

    assert_eq!(left.len() + right.len(), 40);
    assert!(transport.peak_in_flight() <= 3);
}

#[tokio::test]
async fn test_envelope_errors_are_classified() {
    let transport = FakeTransport::new(|target, call| {
        if target.base().path().ends_with("/1") {
            Reply::Body(200, r#"{"status":"error","error":{"code":402,"message":"INVALID_ACCOUNT_ID"}}"#)
        } else if call == 1 {
            Reply::Body(200, r#"{"status":"error","error":{"code":407,"message":"REQUEST_LIMIT_EXCEEDED"}}"#)
        } else {
            Reply::Body(200, r#"{"status":"ok","data":{}}"#)
        }
    });
    let config = fast_config();
    let classifier = Classifier::new(RetryPolicy::from(&config.retry)).with_inspector(Arc::new(EnvelopeInspector));
    let governor = Arc::new(Governor::new(config.governor.clone()));
    let dispatcher = Dispatcher::from_parts(Arc::clone(&transport), governor, classifier, &config);

    let mut sink = MemorySink::new();
    let report = pump(dispatcher.submit(requests(0..3)), &mut sink).await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(sink.is_finished());
    assert!(matches!(
        sink.get(&1).unwrap().outcome,
        Err(FetchError::Api { code: 402, .. })
    ));
    assert_eq!(sink.get(&2).unwrap().attempts, 2);
    assert_eq!(dispatcher.stats().summary().throttled, 2);
}

#[tokio::test]
async fn test_pump_all_interleaves_batches() {
    let first = Dispatcher::new(FakeTransport::ok(), &fast_config());
    let second = Dispatcher::new(FakeTransport::new(|_, _| Reply::Status(404)), &fast_config());

    let batches = vec![first.submit(requests(0..10)), second.submit(requests(10..15))];
    let mut sink = MemorySink::new();
    let report = pump_all(batches, &mut sink).await.unwrap();

    assert_eq!(report.total(), 15);
    assert_eq!(report.succeeded, 10);
    assert_eq!(report.failed, 5);
    assert_eq!(sink.len(), 15);
}

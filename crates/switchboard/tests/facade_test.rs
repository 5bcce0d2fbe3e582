//! End-to-end use of the re-exported API: configuration, registry, broker.

use reqwest::header::HeaderMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use switchboard::{
    BackendRegistry, Broker, BrokerRequest, ContentBlock, FailureKind, GateUpdate,
    HeaderRateLimitDetector, NoopFactory, PayloadSet, SwitchboardConfig,
};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn registry(ids: &[&str], latency: Duration) -> BackendRegistry {
    ids.iter().fold(BackendRegistry::new(), |registry, id| {
        registry.with(Arc::new(NoopFactory::new(*id).with_latency(latency)))
    })
}

#[tokio::test(start_paused = true)]
async fn test_configured_broker_trims_and_times_out() {
    let file = write_config(
        r#"
        [broker]
        max_outstanding = 8

        [backends.fast]
        max_concurrent = 2
        timeout_secs = 10
        max_context_units = 100

        [backends.slow]
        max_concurrent = 1
        timeout_secs = 1
        max_context_units = 10000
        "#,
    );
    let config = SwitchboardConfig::from_file(file.path()).unwrap();

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(NoopFactory::new("fast")));
    registry.register(Arc::new(
        NoopFactory::new("slow").with_latency(Duration::from_secs(5)),
    ));
    let broker = Broker::from_registry(&registry, &config).unwrap();

    let payload = PayloadSet::new()
        .with_block(ContentBlock::new("keep.rs", "k".repeat(200)).with_priority(9))
        .with_block(ContentBlock::new("drop.md", "d".repeat(200)).with_priority(1));
    let response = broker.execute(&BrokerRequest::new(payload)).await;

    assert_eq!(response.fit().dropped(), &vec!["drop.md".to_string()]);

    let report = response.report();
    assert!(report.get("fast").unwrap().is_fulfilled());
    let failure = report.get("slow").unwrap().failure().unwrap();
    assert_eq!(*failure.kind(), FailureKind::Timeout);
    assert_eq!(*report.get("slow").unwrap().elapsed_ms(), 1_000);
}

#[tokio::test]
async fn test_detected_limits_feed_live_updates() {
    let broker = Broker::from_registry(
        &registry(&["openai"], Duration::ZERO),
        &SwitchboardConfig::default(),
    )
    .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit-requests", "500".parse().unwrap());
    let window = *broker.gate_snapshots()[0].limits().window();
    let detector = HeaderRateLimitDetector::new();
    let update = detector.detect("openai", &headers, window).await.unwrap();

    broker.update_backend("openai", update).unwrap();
    let snapshot = &broker.gate_snapshots()[0];
    assert_eq!(*snapshot.limits().requests_per_window(), 500);

    broker
        .update_backend("openai", GateUpdate::default().with_max_concurrent(3))
        .unwrap();
    assert_eq!(*broker.gate_snapshots()[0].limits().max_concurrent(), 3);
}

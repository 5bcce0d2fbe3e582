//! Tests for failure classification.

use std::time::Duration;
use switchboard_error::{
    BackendFailure, ClassifyContext, FailureKind, LARGE_FILE_COUNT, ThrottleError,
    ThrottleErrorKind, classify,
};

fn kind_of(message: &str) -> FailureKind {
    *classify(&BackendFailure::new(message), &ClassifyContext::for_backend("test")).kind()
}

#[test]
fn test_provider_messages_map_to_expected_kinds() {
    let cases = [
        ("Error 401: Unauthorized", FailureKind::Auth),
        ("API key not valid. Please pass a valid API key.", FailureKind::Auth),
        ("HTTP 429 Too Many Requests", FailureKind::Quota),
        ("You exceeded your current quota, please check your plan", FailureKind::Quota),
        ("RESOURCE_EXHAUSTED: generate_content_requests", FailureKind::Quota),
        ("The model `gpt-9` does not exist", FailureKind::Model),
        ("model_not_found", FailureKind::Model),
        ("connect ECONNREFUSED 127.0.0.1:443", FailureKind::Network),
        ("503 Service Unavailable", FailureKind::Network),
        ("Request timed out", FailureKind::Timeout),
        ("DEADLINE_EXCEEDED", FailureKind::Timeout),
        (
            "This model's maximum context length is 128000 tokens",
            FailureKind::ContextSize,
        ),
        ("prompt is too long: 250000 tokens", FailureKind::ContextSize),
        (
            "The input token count (1200000) exceeds the maximum number of tokens allowed (1048576).",
            FailureKind::ContextSize,
        ),
        ("the server made a sound", FailureKind::Unknown),
    ];

    for (message, expected) in cases {
        assert_eq!(kind_of(message), expected, "message: {message}");
    }
}

#[test]
fn test_classification_is_deterministic() {
    let message = "upstream said: 429 rate limit, retry after 20s";
    let first = kind_of(message);
    for _ in 0..50 {
        assert_eq!(kind_of(message), first);
    }
}

#[test]
fn test_classified_failure_carries_identity_and_message() {
    let failure = classify(
        &BackendFailure::new("403 Forbidden"),
        &ClassifyContext::for_backend("anthropic"),
    );
    assert_eq!(failure.backend_id(), "anthropic");
    assert_eq!(failure.message(), "403 Forbidden");
    assert!(!*failure.retryable());
    assert!(failure.remediation()[0].contains("anthropic"));
}

#[test]
fn test_context_size_hints_use_request_facts() {
    let ctx = ClassifyContext::for_backend("gemini")
        .with_file_count(LARGE_FILE_COUNT + 5)
        .with_estimated_units(300_000)
        .with_max_units(200_000);
    let failure = classify(&BackendFailure::new("token limit exceeded"), &ctx);

    assert_eq!(*failure.kind(), FailureKind::ContextSize);
    assert!(failure.remediation()[0].contains("300000"));
    assert!(failure.remediation()[0].contains("200000"));
    assert!(
        failure
            .remediation()
            .iter()
            .any(|hint| hint.contains("Reduce file count"))
    );
}

#[test]
fn test_small_file_count_does_not_suggest_fewer_files() {
    let ctx = ClassifyContext::for_backend("gemini").with_file_count(2);
    let failure = classify(&BackendFailure::new("context window exceeded"), &ctx);
    assert!(
        !failure
            .remediation()
            .iter()
            .any(|hint| hint.contains("Reduce file count"))
    );
}

#[test]
fn test_timeout_hint_mentions_configured_timeout() {
    let ctx = ClassifyContext::for_backend("openai").with_timeout(Duration::from_secs(30));
    let failure = classify(&BackendFailure::new("deadline exceeded"), &ctx);
    assert!(*failure.retryable());
    assert!(failure.remediation()[0].contains("30s"));
}

#[test]
fn test_throttle_timeouts_are_tagged() {
    let err = ThrottleError::new(ThrottleErrorKind::QueueTimeout {
        backend: "gemini".to_string(),
        waited: Duration::from_secs(10),
    });
    let failure = BackendFailure::from(err);
    assert_eq!(failure.kind(), Some(FailureKind::Timeout));
}

#[test]
fn test_failure_kind_string_forms() {
    assert_eq!(FailureKind::ContextSize.to_string(), "context_size");
    assert_eq!(
        "quota".parse::<FailureKind>().ok(),
        Some(FailureKind::Quota)
    );
    assert_eq!(
        serde_json::to_string(&FailureKind::Timeout).unwrap(),
        "\"timeout\""
    );
}

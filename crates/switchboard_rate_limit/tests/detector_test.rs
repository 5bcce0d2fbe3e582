//! Tests for header-based limit detection.

use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use switchboard_rate_limit::{HEADER_LIMIT_WINDOW, HeaderRateLimitDetector};

fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_static(*value));
    }
    map
}

#[tokio::test]
async fn test_detects_anthropic_limit() {
    let detector = HeaderRateLimitDetector::new();
    let update = detector
        .detect(
            "anthropic",
            &headers(&[("anthropic-ratelimit-requests-limit", "50")]),
            HEADER_LIMIT_WINDOW,
        )
        .await
        .unwrap();

    assert_eq!(update.requests_per_window, Some(50));
    assert!(update.max_concurrent.is_none());
}

#[tokio::test]
async fn test_prefers_specific_header() {
    let detector = HeaderRateLimitDetector::new();
    let update = detector
        .detect(
            "openai",
            &headers(&[
                ("x-ratelimit-limit", "10"),
                ("x-ratelimit-limit-requests", "500"),
            ]),
            HEADER_LIMIT_WINDOW,
        )
        .await
        .unwrap();

    assert_eq!(update.requests_per_window, Some(500));
}

#[tokio::test]
async fn test_ignores_missing_and_unusable_headers() {
    let detector = HeaderRateLimitDetector::new();
    assert!(detector.detect("a", &HeaderMap::new(), HEADER_LIMIT_WINDOW).await.is_none());
    assert!(
        detector
            .detect("a", &headers(&[("x-ratelimit-limit", "lots")]), HEADER_LIMIT_WINDOW)
            .await
            .is_none()
    );
    assert!(
        detector
            .detect("a", &headers(&[("x-ratelimit-limit", "0")]), HEADER_LIMIT_WINDOW)
            .await
            .is_none()
    );
    assert!(detector.cached("a").await.is_none());
}

#[tokio::test]
async fn test_cache_is_per_backend() {
    let detector = HeaderRateLimitDetector::new();
    detector
        .detect(
            "gemini",
            &headers(&[("x-ratelimit-limit", "15")]),
            HEADER_LIMIT_WINDOW,
        )
        .await;

    assert_eq!(
        detector.cached("gemini").await.unwrap().requests_per_window,
        Some(15)
    );
    assert!(detector.cached("openai").await.is_none());

    detector.clear_cache().await;
    assert!(detector.cached("gemini").await.is_none());
}

#[tokio::test]
async fn test_limit_is_scaled_to_gate_window() {
    let detector = HeaderRateLimitDetector::new();
    let per_minute = headers(&[("x-ratelimit-limit-requests", "60")]);

    let second = detector
        .detect("openai", &per_minute, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(second.requests_per_window, Some(1));

    let hour = detector
        .detect("openai", &per_minute, Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(hour.requests_per_window, Some(3600));
    assert_eq!(
        detector.cached("openai").await.unwrap().requests_per_window,
        Some(3600)
    );
}

#[tokio::test]
async fn test_small_limit_never_scales_to_zero() {
    let detector = HeaderRateLimitDetector::new();
    let update = detector
        .detect(
            "gemini",
            &headers(&[("x-ratelimit-limit", "5")]),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

    assert_eq!(update.requests_per_window, Some(1));
}

use std::time::Duration;
use switchboard_core::{
    BackendDescriptor, DEFAULT_MAX_CONTEXT_UNITS, DEFAULT_TIMEOUT, DEFAULT_WINDOW,
};
use switchboard_error::{BuilderError, BuilderErrorKind};

#[test]
fn test_defaults_apply() {
    let descriptor = BackendDescriptor::builder().id("openai").build().unwrap();

    assert_eq!(*descriptor.max_concurrent(), 1);
    assert_eq!(*descriptor.requests_per_window(), 0);
    assert_eq!(*descriptor.window(), DEFAULT_WINDOW);
    assert_eq!(*descriptor.timeout(), DEFAULT_TIMEOUT);
    assert_eq!(*descriptor.max_context_units(), DEFAULT_MAX_CONTEXT_UNITS);
    assert!(!descriptor.is_rate_limited());
}

#[test]
fn test_missing_id_is_reported() {
    let err: BuilderError = BackendDescriptor::builder()
        .max_concurrent(2usize)
        .build()
        .unwrap_err()
        .into();

    assert!(matches!(err.kind(), BuilderErrorKind::MissingField(field) if field == "id"));
}

#[test]
fn test_zero_limits_are_rejected() {
    assert!(
        BackendDescriptor::builder()
            .id("a")
            .max_concurrent(0usize)
            .build()
            .is_err()
    );
    assert!(
        BackendDescriptor::builder()
            .id("a")
            .timeout(Duration::ZERO)
            .build()
            .is_err()
    );
    assert!(
        BackendDescriptor::builder()
            .id("a")
            .window(Duration::ZERO)
            .build()
            .is_err()
    );
    assert!(BackendDescriptor::builder().id("  ").build().is_err());
}

#[test]
fn test_serializes_to_json() {
    let descriptor = BackendDescriptor::builder()
        .id("anthropic")
        .requests_per_window(50u32)
        .build()
        .unwrap();
    let json = serde_json::to_value(&descriptor).unwrap();

    assert_eq!(json["id"], "anthropic");
    assert_eq!(json["requests_per_window"], 50);
}

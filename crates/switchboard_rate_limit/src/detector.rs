//! Live limit detection from provider response headers.
//!
//! Providers advertise the request limit they actually enforce. Feeding that
//! number back into a gate keeps the local approximation close to the
//! provider's real quota after tier changes. The headers count requests per
//! minute; detections are rescaled to the gate's own window.

use crate::GateUpdate;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Request-limit headers, most specific first.
const REQUEST_LIMIT_HEADERS: &[&str] = &[
    "x-ratelimit-limit-requests",
    "anthropic-ratelimit-requests-limit",
    "x-ratelimit-limit",
];

/// Window the request-limit headers are expressed over.
pub const HEADER_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Detects and caches request limits from API response headers.
///
/// # Example
///
/// ```
/// use reqwest::header::{HeaderMap, HeaderValue};
/// use std::time::Duration;
/// use switchboard_rate_limit::HeaderRateLimitDetector;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let detector = HeaderRateLimitDetector::new();
/// let mut headers = HeaderMap::new();
/// headers.insert("x-ratelimit-limit-requests", HeaderValue::from_static("500"));
///
/// let update = detector
///     .detect("openai", &headers, Duration::from_secs(60))
///     .await
///     .unwrap();
/// assert_eq!(update.requests_per_window, Some(500));
///
/// // A 6s gate window gets a tenth of the per-minute quota.
/// let update = detector
///     .detect("openai", &headers, Duration::from_secs(6))
///     .await
///     .unwrap();
/// assert_eq!(update.requests_per_window, Some(50));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeaderRateLimitDetector {
    /// Last detection per backend
    detected: Arc<RwLock<HashMap<String, GateUpdate>>>,
}

impl HeaderRateLimitDetector {
    /// Create a new header rate limit detector.
    #[instrument]
    pub fn new() -> Self {
        debug!("Creating new header rate limit detector");
        Self::default()
    }

    /// Parse a request limit from `headers`, rescale it from
    /// [`HEADER_LIMIT_WINDOW`] to `window`, and cache it for `backend_id`.
    ///
    /// Returns `None` when no known header carries a positive integer. A
    /// positive limit never scales below one request per window.
    #[instrument(skip(self, headers))]
    pub async fn detect(
        &self,
        backend_id: &str,
        headers: &HeaderMap,
        window: Duration,
    ) -> Option<GateUpdate> {
        let (header, limit) = REQUEST_LIMIT_HEADERS
            .iter()
            .find_map(|&name| parse_header_u32(headers, name).map(|limit| (name, limit)))?;
        if limit == 0 {
            return None;
        }
        let scaled = scale_to_window(limit, window);
        debug!(header, limit, scaled, "Detected request limit from headers");

        let update = GateUpdate::default().with_requests_per_window(scaled);
        self.detected
            .write()
            .await
            .insert(backend_id.to_string(), update);
        Some(update)
    }

    /// Last detection for a backend.
    #[instrument(skip(self))]
    pub async fn cached(&self, backend_id: &str) -> Option<GateUpdate> {
        let cached = self.detected.read().await.get(backend_id).copied();
        debug!(has_cached = cached.is_some(), "Retrieving cached limits");
        cached
    }

    /// Forget every cached detection.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) {
        debug!("Clearing cached limits");
        self.detected.write().await.clear();
    }
}

fn parse_header_u32(headers: &HeaderMap, key: &str) -> Option<u32> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}

fn scale_to_window(per_minute: u32, window: Duration) -> u32 {
    let scaled = u128::from(per_minute) * window.as_millis() / HEADER_LIMIT_WINDOW.as_millis();
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

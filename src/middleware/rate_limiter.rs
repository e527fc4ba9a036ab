//! Per-client rate limiting middleware
//!
//! Fixed-window counter keyed by client IP. Windows reset once per second;
//! a burst allowance of twice the configured rate absorbs short spikes.

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::sync::RwLock;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Rate limiter state shared across requests
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
    max_per_window: u32,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` sustained, 2x burst
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_per_window: requests_per_second.saturating_mul(2),
        }
    }

    /// Record a request for `key` and report whether it is allowed
    pub async fn check(&self, key: &str) -> bool {
        let mut windows = self.windows.write().await;
        let now = Instant::now();

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started).as_secs() >= 1 {
            window.started = now;
            window.count = 0;
        }

        window.count += 1;
        window.count <= self.max_per_window
    }

    /// Drop windows idle longer than `max_age`
    pub async fn cleanup(&self, max_age: std::time::Duration) {
        let mut windows = self.windows.write().await;
        let now = Instant::now();
        windows.retain(|_, w| now.duration_since(w.started) < max_age);
    }
}

/// Create rate limiting middleware layer
pub fn rate_limit_layer(
    rate_limiter: RateLimiter,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send {
    move |request: Request<Body>, next: Next| {
        let rate_limiter = rate_limiter.clone();
        Box::pin(async move {
            let client_key = extract_client_ip(&request);

            if !rate_limiter.check(&client_key).await {
                tracing::warn!(client = %client_key, "Rate limit exceeded");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, "1")],
                    "Too many requests. Please try again later.",
                )
                    .into_response();
            }

            next.run(request).await
        })
    }
}

/// Extract client IP from proxy headers, falling back to "unknown"
fn extract_client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(ip) = s.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(s) = real_ip.to_str() {
            return s.to_string();
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_blocks_after_burst() {
        let limiter = RateLimiter::new(5); // 10 allowed per window

        for _ in 0..10 {
            assert!(limiter.check("test-client").await);
        }

        assert!(!limiter.check("test-client").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_isolates_clients() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-b").await);
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-b").await);
    }
}

//! Fixed-window request limiter keyed by client address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tracing::warn;

use super::client_ip::ClientIp;
use super::error_response;

/// Bucket for requests whose address could not be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Expired windows are swept once this many clients are tracked.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    trust_proxy_headers: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, trust_proxy_headers: bool) -> Self {
        Self {
            limit,
            window,
            trust_proxy_headers,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32, trust_proxy_headers: bool) -> Self {
        Self::new(limit, Duration::from_secs(60), trust_proxy_headers)
    }

    /// Count one request for `key`; `false` once the window is used up.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < self.window);
        }
        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ClientIp(ip) = ClientIp::resolve(
        request.headers(),
        request.extensions(),
        limiter.trust_proxy_headers,
    );
    let key = ip.as_deref().unwrap_or(UNKNOWN_CLIENT);
    if !limiter.check(key) {
        warn!(client_ip = %key, "Rate limit exceeded");
        return error_response(StatusCode::TOO_MANY_REQUESTS, "Too many requests");
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_each_client_separately() {
        let limiter = RateLimiter::per_minute(2, true);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), true);
        let start = Instant::now();
        assert!(limiter.check_at("10.0.0.1", start));
        assert!(!limiter.check_at("10.0.0.1", start + Duration::from_secs(59)));
        assert!(limiter.check_at("10.0.0.1", start + Duration::from_secs(60)));
    }
}

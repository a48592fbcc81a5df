//! Request screening in front of the protected endpoints: a sliding-window
//! limiter keyed by client address and a sanity check on proxy headers.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_REQUESTS: usize = 100;

const SWEEP_THRESHOLD: usize = 1024;

const FORWARDING_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-forwarded-host",
    "x-forwarded-proto",
];

const ALLOWED_CONTENT_TYPES: [&str; 4] = [
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

/// Sliding-window request counter per client key.
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request for `key` unless the window is already full.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);

        if requests.len() > SWEEP_THRESHOLD {
            let window = self.window;
            requests.retain(|_, times| {
                times
                    .back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < window)
            });
        }

        let times = requests.entry(key.to_string()).or_default();
        while times
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.max_requests {
            return false;
        }
        times.push_back(now);
        true
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, then `cf-connecting-ip`.
pub fn client_key(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .or_else(|| header_str(headers, "cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

/// Problems with proxy headers or the declared body type, one message each.
pub fn validate_headers(headers: &HeaderMap) -> Vec<String> {
    let mut errors = Vec::new();

    for name in FORWARDING_HEADERS {
        if let Some(value) = headers.get(name) {
            let bytes = value.as_bytes();
            if bytes.iter().any(|b| matches!(b, b',' | b'\n' | b'\r')) {
                errors.push(format!("Suspicious {} header", name));
            }
        }
    }

    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let essence = content_type
            .to_str()
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
            errors.push(format!("Unsupported content type: {}", essence));
        }
    }

    errors
}

/// Rejects the request with 400 when its headers look forged or the client
/// has used up its window. Runs before authentication, in every environment.
pub async fn screen_request(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut errors = validate_headers(req.headers());

    let client = client_key(req.headers());
    if !state.rate_limiter.is_allowed(&client) {
        errors.push("Rate limit exceeded".to_string());
    }

    if !errors.is_empty() {
        warn!(client = %client, path = req.uri().path(), ?errors, "Request failed security validation");
        return Err(ApiError::bad_request_with("Security validation failed", errors));
    }

    Ok(next.run(req).await)
}

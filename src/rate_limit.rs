//! Per-client, per-route fixed-window rate limiting.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, warn};

use crate::error::AppError;
use crate::state::AppState;

/// Windows are swept once the table grows past this many keys.
const SWEEP_THRESHOLD: usize = 10_000;

/// Route label for requests that matched no route.
const FALLBACK_ROUTE: &str = "<fallback>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateRule {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    pub const fn per_hour(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(3600),
        }
    }
}

pub const DEFAULT_RULE: RateRule = RateRule::per_hour(100);

/// Limit for a route, keyed by method and the matched route template.
pub fn rule_for(method: &Method, path: &str) -> RateRule {
    match (method.as_str(), path) {
        ("GET", "/") => RateRule::per_minute(30),
        ("GET", "/health") => RateRule::per_minute(60),
        ("POST", "/auth/login") => RateRule::per_minute(5),
        ("POST", "/auth/students/register") => RateRule::per_minute(3),
        ("POST", "/auth/students/login") => RateRule::per_minute(10),
        ("POST", "/auth/refresh") => RateRule::per_minute(10),
        ("GET", "/workshops") => RateRule::per_minute(60),
        ("GET", "/workshops/{id}") => RateRule::per_minute(30),
        ("POST" | "DELETE", "/workshops/{id}/register") => RateRule::per_minute(10),
        ("GET", "/stats") => RateRule::per_minute(20),
        ("GET", "/categories") => RateRule::per_minute(30),
        _ => DEFAULT_RULE,
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
    length: Duration,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    enabled: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Number of windows currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn check(&self, key: &str, rule: RateRule) -> Result<(), AppError> {
        self.check_at(key, rule, Instant::now())
    }

    fn check_at(&self, key: &str, rule: RateRule, now: Instant) -> Result<(), AppError> {
        if !self.enabled {
            return Ok(());
        }

        let mut windows = self.windows.lock().map_err(|_| {
            error!("rate limiter lock poisoned");
            AppError::InternalServerError
        })?;

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < w.length);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
            length: rule.window,
        });
        if now.duration_since(window.started) >= window.length {
            *window = Window {
                started: now,
                count: 0,
                length: rule.window,
            };
        }

        if window.count >= rule.max_requests {
            let remaining = window.length.saturating_sub(now.duration_since(window.started));
            return Err(AppError::TooManyRequests {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }
        window.count += 1;
        Ok(())
    }
}

fn client_key(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // unmatched requests share one bucket so arbitrary URIs cannot grow the table
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| FALLBACK_ROUTE.to_string());
    let rule = rule_for(req.method(), &path);
    let client = client_key(&req);
    let key = format!("{client} {} {path}", req.method());

    if let Err(err) = state.rate_limiter.check(&key, rule) {
        warn!(client = %client, route = %path, "rate limit exceeded");
        return Err(err);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(true);
        let rule = RateRule::per_minute(3);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("client", rule, now).is_ok());
        }
        match limiter.check_at("client", rule, now + Duration::from_secs(20)) {
            Err(AppError::TooManyRequests { retry_after_secs }) => assert_eq!(retry_after_secs, 40),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let limiter = RateLimiter::new(true);
        let rule = RateRule::per_minute(1);
        let now = Instant::now();

        assert!(limiter.check_at("client", rule, now).is_ok());
        assert!(limiter.check_at("client", rule, now).is_err());
        assert!(limiter.check_at("client", rule, now + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(true);
        let rule = RateRule::per_minute(1);
        let now = Instant::now();

        assert!(limiter.check_at("a", rule, now).is_ok());
        assert!(limiter.check_at("b", rule, now).is_ok());
    }

    #[test]
    fn disabled_limiter_never_rejects() {
        let limiter = RateLimiter::new(false);
        let rule = RateRule::per_minute(0);
        assert!(limiter.check("client", rule).is_ok());
    }

    #[test]
    fn route_rules() {
        assert_eq!(rule_for(&Method::POST, "/auth/login"), RateRule::per_minute(5));
        assert_eq!(rule_for(&Method::DELETE, "/workshops/{id}/register"), RateRule::per_minute(10));
        assert_eq!(rule_for(&Method::POST, "/workshops"), DEFAULT_RULE);
    }

    #[tokio::test]
    async fn unknown_paths_share_one_window() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        use crate::config::Config;
        use crate::db::connect_in_memory;

        let pool = connect_in_memory().await.unwrap();
        let state = AppState::new(pool, Config::default());
        let limiter = state.rate_limiter.clone();
        let app = crate::api::router(state);

        for n in 0..50 {
            let req = Request::builder()
                .uri(format!("/nowhere-{n}"))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        assert_eq!(limiter.tracked_keys(), 1);
    }
}

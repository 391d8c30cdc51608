//! Per-client request throttling.
//!
//! Each client IP gets a fixed window per tier: the storefront API, the auth
//! endpoints (login, registration, password reset) and the payment provider
//! webhooks. Outside production every tier is relaxed to
//! `development_requests_per_window` so local testing never trips it.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::{RateLimitConfig, RunEnvironment};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    Api,
    Auth,
    Webhook,
}

/// Requests seen from one client in the current window
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Quota left after an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: u64,
}

/// A rejected request and when the client may retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    pub limit: u32,
    pub retry_after: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<(IpAddr, RateLimitTier), Window>,
    enabled: bool,
    window: Duration,
    api_limit: u32,
    auth_limit: u32,
    webhook_limit: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, environment: RunEnvironment) -> Self {
        let relaxed = match environment {
            RunEnvironment::Production => None,
            RunEnvironment::Development => Some(config.development_requests_per_window),
        };

        Self {
            windows: DashMap::new(),
            enabled: config.enabled,
            window: Duration::from_secs(config.window_seconds),
            api_limit: relaxed.unwrap_or(config.api_requests_per_window),
            auth_limit: relaxed.unwrap_or(config.auth_requests_per_window),
            webhook_limit: relaxed.unwrap_or(config.webhook_requests_per_window),
        }
    }

    pub fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.api_limit,
            RateLimitTier::Auth => self.auth_limit,
            RateLimitTier::Webhook => self.webhook_limit,
        }
    }

    /// Count a request from `ip` against `tier`.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<Quota, Throttled> {
        self.check_at(ip, tier, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, tier: RateLimitTier, now: Instant) -> Result<Quota, Throttled> {
        let limit = self.limit_for(tier);
        if !self.enabled {
            return Ok(Quota {
                limit,
                remaining: limit,
                reset_after: 0,
            });
        }

        let mut window = self.windows.entry((ip, tier)).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(window.started))
            .as_secs()
            .max(1);

        if window.count >= limit {
            return Err(Throttled {
                limit,
                retry_after: reset_after,
            });
        }

        window.count += 1;
        Ok(Quota {
            limit,
            remaining: limit - window.count,
            reset_after,
        })
    }

    /// Drop windows that have already ended
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        self.windows
            .retain(|_, window| now.duration_since(window.started) < self.window);
        self.windows.len()
    }
}

/// Client address, preferring proxy headers over the socket peer
fn client_ip(request: &Request<Body>) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        })
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn set_header(response: &mut Response, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(name), value);
    }
}

/// Middleware applied per route group with its tier:
/// `middleware::from_fn_with_state((state, RateLimitTier::Auth), throttle)`
pub async fn throttle(
    State((state, tier)): State<(Arc<AppState>, RateLimitTier)>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match state.rate_limiter.check(ip, tier) {
        Ok(quota) => {
            let mut response = next.run(request).await;
            set_header(&mut response, "x-ratelimit-limit", quota.limit);
            set_header(&mut response, "x-ratelimit-remaining", quota.remaining);
            set_header(&mut response, "x-ratelimit-reset", quota.reset_after);
            response
        }
        Err(throttled) => {
            tracing::warn!(%ip, ?tier, "Rate limit exceeded");
            let mut response =
                ApiError::rate_limited("Too many requests from this IP, please try again later.")
                    .into_response();
            set_header(&mut response, "retry-after", throttled.retry_after);
            set_header(&mut response, "x-ratelimit-limit", throttled.limit);
            set_header(&mut response, "x-ratelimit-remaining", 0);
            response
        }
    }
}

/// Periodically forget finished windows
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let tracked = rate_limiter.prune();
            tracing::debug!(tracked, "Pruned rate limit windows");
        }
    });
}

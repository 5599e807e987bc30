/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{FlockError, FlockResult},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rps);
    Quota::per_second(rps).allow_burst(burst)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated_rps: u32,
    authenticated: Arc<DirectLimiter>,
    anonymous: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        // Anonymous callers get a fifth of the burst allowance
        let anonymous_burst = (config.burst_size / 5).max(1);

        Self {
            enabled: config.enabled,
            authenticated_rps: config.authenticated_rps,
            authenticated: Arc::new(GovernorLimiter::direct(quota(
                config.authenticated_rps,
                config.burst_size,
            ))),
            anonymous: Arc::new(GovernorLimiter::direct(quota(
                config.anonymous_rps,
                anonymous_burst,
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check rate limit for a caller presenting a token
    pub fn check_authenticated(&self) -> FlockResult<()> {
        self.authenticated
            .check()
            .map_err(|_| FlockError::RateLimitExceeded)
    }

    /// Check rate limit for an anonymous caller
    pub fn check_anonymous(&self) -> FlockResult<()> {
        self.anonymous
            .check()
            .map_err(|_| FlockError::RateLimitExceeded)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, FlockError> {
    let limiter = &ctx.rate_limiter;
    if !limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let has_auth_header = request.headers().contains_key(header::AUTHORIZATION);

    let result = if has_auth_header {
        limiter.check_authenticated()
    } else {
        limiter.check_anonymous()
    };

    if let Err(e) = result {
        tracing::warn!(path = %request.uri().path(), authenticated = has_auth_header, "Rate limit exceeded");
        return Err(e);
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "X-RateLimit-Limit",
        HeaderValue::from(limiter.authenticated_rps),
    );

    Ok(response)
}

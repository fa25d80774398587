//! Request-rate limiting middleware.
//!
//! Counts requests per identity (API key when present, client address
//! otherwise) and rejects excess requests with a 429. Two strategies are
//! available: a token bucket with continuous refill, and a fixed-window
//! counter that resets when the window elapses.

use crate::api::error::ApiError;
use crate::config::RateLimitConfig;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
    time::{Duration, Instant},
};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

/// Remove stale identities this often
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Drop an identity after this long without a request
const ENTRY_EXPIRY: Duration = Duration::from_secs(600);

#[derive(Debug, ThisError)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    LimitExceeded { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    TokenBucket,
    FixedWindow,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Strategy> {
        match s {
            "token_bucket" => Some(Strategy::TokenBucket),
            "fixed_window" => Some(Strategy::FixedWindow),
            _ => None,
        }
    }
}

/// Token bucket state for a single identity
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens
    tokens: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
    /// Rate of token refill (tokens per second)
    rate: f64,
    /// Maximum tokens (burst size)
    max_tokens: f64,
}

impl TokenBucket {
    fn new(limit: u32, window: Duration) -> Self {
        TokenBucket {
            tokens: limit as f64,
            last_refill: Instant::now(),
            rate: limit as f64 / window.as_secs_f64(),
            max_tokens: limit as f64,
        }
    }

    /// Attempt to consume one token. Returns true if successful.
    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let new_tokens = elapsed * self.rate;

        self.tokens = (self.tokens + new_tokens).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Time until one token is available
    fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }

        let needed = 1.0 - self.tokens;
        Duration::from_secs_f64(needed / self.rate)
    }

    fn remaining(&self) -> u32 {
        self.tokens.max(0.0) as u32
    }
}

/// Fixed-window counter state for a single identity
#[derive(Debug)]
struct FixedWindow {
    count: u32,
    window_start: Instant,
    limit: u32,
    window: Duration,
}

impl FixedWindow {
    fn new(limit: u32, window: Duration) -> Self {
        FixedWindow {
            count: 0,
            window_start: Instant::now(),
            limit,
            window,
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }

        if self.count < self.limit {
            self.count += 1;
            true
        } else {
            false
        }
    }

    fn time_until_reset(&self) -> Duration {
        self.window
            .saturating_sub(self.window_start.elapsed())
    }

    fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

#[derive(Debug)]
enum LimiterState {
    Bucket(TokenBucket),
    Window(FixedWindow),
}

impl LimiterState {
    fn try_consume(&mut self) -> bool {
        match self {
            LimiterState::Bucket(b) => b.try_consume(),
            LimiterState::Window(w) => w.try_consume(),
        }
    }

    fn retry_after(&self) -> Duration {
        match self {
            LimiterState::Bucket(b) => b.time_until_available(),
            LimiterState::Window(w) => w.time_until_reset(),
        }
    }

    fn remaining(&self) -> u32 {
        match self {
            LimiterState::Bucket(b) => b.remaining(),
            LimiterState::Window(w) => w.remaining(),
        }
    }
}

/// Identity entry with expiry tracking
#[derive(Debug)]
struct ClientEntry {
    state: LimiterState,
    last_seen: Instant,
}

/// What an allowed request is told about its budget, for response headers.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
}

/// Shared rate limiter state, cloned into each middleware instance.
#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<RwLock<HashMap<String, ClientEntry>>>,
    last_cleanup: Arc<RwLock<Instant>>,
    strategy: Strategy,
    limit: u32,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(strategy: Strategy, limit: u32, window: Duration, enabled: bool) -> Self {
        RateLimiter {
            entries: Arc::new(RwLock::new(HashMap::new())),
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
            strategy,
            limit,
            window,
            enabled,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let strategy = Strategy::parse(&config.strategy).unwrap_or_else(|| {
            warn!(
                "Unknown rate limit strategy '{}', falling back to token_bucket",
                config.strategy
            );
            Strategy::TokenBucket
        });

        Self::new(
            strategy,
            config.requests,
            Duration::from_secs(config.window_secs),
            config.enabled,
        )
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn new_state(&self) -> LimiterState {
        match self.strategy {
            Strategy::TokenBucket => LimiterState::Bucket(TokenBucket::new(self.limit, self.window)),
            Strategy::FixedWindow => LimiterState::Window(FixedWindow::new(self.limit, self.window)),
        }
    }

    /// Check whether a request from the given identity is allowed.
    pub fn check(&self, identity: &str) -> Result<Quota, RateLimitError> {
        if !self.enabled {
            return Ok(Quota {
                limit: self.limit,
                remaining: self.limit,
            });
        }

        self.maybe_cleanup();

        let mut entries = self.entries.write();
        let entry = entries
            .entry(identity.to_string())
            .or_insert_with(|| ClientEntry {
                state: self.new_state(),
                last_seen: Instant::now(),
            });

        entry.last_seen = Instant::now();

        if entry.state.try_consume() {
            Ok(Quota {
                limit: self.limit,
                remaining: entry.state.remaining(),
            })
        } else {
            let wait = entry.state.retry_after();
            let retry_after_secs = (wait.as_secs_f64().ceil() as u64).max(1);
            Err(RateLimitError::LimitExceeded { retry_after_secs })
        }
    }

    /// Sweep identities that have not been seen for a while
    fn maybe_cleanup(&self) {
        let mut last_cleanup = self.last_cleanup.write();
        if last_cleanup.elapsed() < CLEANUP_INTERVAL {
            return;
        }

        *last_cleanup = Instant::now();
        drop(last_cleanup);

        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.last_seen.elapsed() < ENTRY_EXPIRY);

        debug!("Rate limiter cleanup: {} identities remaining", entries.len());
    }
}

/// The identity a request is counted against: the API key when one is
/// presented, the client address otherwise.
fn resolve_identity(req: &ServiceRequest) -> String {
    let api_key = req
        .headers()
        .get("X-API-KEY")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    match api_key {
        Some(key) => format!("api:{}", key),
        None => match req.peer_addr() {
            Some(addr) => format!("ip:{}", addr.ip()),
            None => "ip:unknown".to_string(),
        },
    }
}

pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(limiter: RateLimiter) -> Self {
        RateLimit { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        if !self.limiter.enabled() {
            return Box::pin(async move { srv.call(req).await });
        }

        let identity = resolve_identity(&req);

        match self.limiter.check(&identity) {
            Ok(quota) => Box::pin(async move {
                let mut res = srv.call(req).await?;

                let headers = res.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&quota.limit.to_string()) {
                    headers.insert(HeaderName::from_static("x-ratelimit-limit"), value);
                }
                if let Ok(value) = HeaderValue::from_str(&quota.remaining.to_string()) {
                    headers.insert(HeaderName::from_static("x-ratelimit-remaining"), value);
                }

                Ok(res)
            }),
            Err(RateLimitError::LimitExceeded { retry_after_secs }) => {
                warn!(
                    "Rate limit exceeded for key={} retry_after_secs={}",
                    identity, retry_after_secs
                );
                let limit = self.limiter.limit();
                Box::pin(async move {
                    Err(ApiError::RateLimited {
                        limit,
                        retry_after_secs,
                    }
                    .into())
                })
            }
        }
    }
}

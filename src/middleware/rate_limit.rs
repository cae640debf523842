//! Per-client rate limiting middleware.
//!
//! # Algorithm
//!
//! Each client gets a token bucket (GCRA via the Governor crate) with
//! capacity `burst` refilled continuously at `rps` tokens per second. A
//! request consumes one token; an empty bucket yields `429 Too Many
//! Requests` with a `Retry-After` header and the request is not forwarded.
//!
//! # Client Key
//!
//! Buckets are keyed by the peer host (see [`super::ip`]). A request with no
//! peer address is a server-side wiring fault: it is answered with 500 and
//! consumes no token.
//!
//! # Configuration
//!
//! Settings are read from [`AppState::limiter_config`] once per request, so
//! a swapped configuration applies from the next request on. With
//! `enabled = false` every request is forwarded untouched.

use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use tower::{Layer, Service};
use tracing::{error, warn};

use super::ip::client_id;
use super::registry::quota_for;
use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;

/// Rate limiting layer for Tower middleware stack.
#[derive(Clone)]
pub struct RateLimitLayer {
    state: AppState,
}

impl RateLimitLayer {
    pub fn new(state: &AppState) -> Self {
        Self {
            state: state.clone(),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: AppState,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let config = state.limiter_config();
            if !config.enabled {
                return inner.call(req).await;
            }

            let Some(client) = client_id(&req, &state.trusted_proxies) else {
                error!(
                    path = %req.uri().path(),
                    "No peer address on request; serve with connect info enabled"
                );
                return Ok(AppError::MissingClientAddress.into_response());
            };

            let Some(quota) = quota_for(&config) else {
                return Ok(AppError::ConfigError(format!(
                    "cannot build limiter quota from rps={} burst={}",
                    config.rps, config.burst
                ))
                .into_response());
            };

            let bucket = state.registry.get_or_create(&client, quota);

            match bucket.check() {
                Ok(_) => inner.call(req).await,
                Err(not_until) => {
                    let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                    let retry_after_secs = retry_after_secs(wait_time);

                    warn!(
                        client_ip = %client,
                        path = %req.uri().path(),
                        retry_after_secs,
                        "Rate limit exceeded for client"
                    );
                    metrics::record_rate_limited();

                    Ok(AppError::RateLimited { retry_after_secs }.into_response())
                }
            }
        })
    }
}

/// Whole seconds a client should wait, rounded up and never below one.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

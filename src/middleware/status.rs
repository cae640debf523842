//! Response status capture and request metrics.
//!
//! [`StatusRecorder`] remembers the first status code a response was given,
//! defaulting to `200 OK` when none is recorded. [`MetricsLayer`] creates one
//! per request, feeds it the final response, and reports response time and
//! status to the metrics recorder.

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::trace;

use crate::metrics;

/// Captures the status written for a single response.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusRecorder {
    status: Option<StatusCode>,
}

impl StatusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a written status. Only the first call has any effect.
    pub fn record(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// The first recorded status, or `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}

/// Records response time and status for every request.
#[derive(Clone, Default)]
pub struct MetricsLayer;

impl MetricsLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for MetricsService<S>
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
        let started = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut recorder = StatusRecorder::new();
            let response = inner.call(req).await?;
            recorder.record(response.status());

            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let status = recorder.status();
            trace!(status = status.as_u16(), elapsed_ms, "Response completed");
            metrics::record_response(status.as_u16(), elapsed_ms);

            Ok(response)
        })
    }
}

//! Middleware composition and route table.
//!
//! # Pipeline (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Trace / Metrics  │ ← observe only, never answer
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Panic Recovery   │ ← 500 + Connection: close on panic
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client's bucket is empty
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 on a bad credential, sets Identity
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Route gates    │ ← 401 / 403 per route
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! Recovery sits outside every layer that can fail, rate limiting rejects
//! before any credential lookup is spent, and the identity is in place
//! before any gate reads it.

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    AuthenticateLayer, MetricsLayer, PermissionGate, RateLimitLayer, recover_panic,
    require_activated_user, require_permission,
};
use crate::state::AppState;

/// Permission required to list movies.
pub const MOVIES_READ: &str = "movies:read";

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let routes = api_routes(&state);
    compose(routes, state)
}

/// Wrap `routes` in the request pipeline and attach the state.
///
/// Route-specific gates belong on the routes themselves; see
/// [`crate::middleware::authorize`].
pub fn compose(routes: Router<AppState>, state: AppState) -> Router {
    let limiter = state.limiter_config();
    if limiter.enabled {
        info!(
            rps = limiter.rps,
            burst = limiter.burst,
            trusted_proxies = state.config.trusted_proxies.len(),
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled (LIMITER_ENABLED=false)");
    }

    // Applied bottom to top: the last layer added runs first
    routes
        .layer(AuthenticateLayer::new(&state))
        .layer(RateLimitLayer::new(&state))
        .layer(recover_panic())
        .layer(MetricsLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route(
            "/v1/users/me",
            get(handlers::current_user).route_layer(from_fn(require_activated_user)),
        )
        .route(
            "/v1/movies",
            get(handlers::list_movies).route_layer(from_fn_with_state(
                PermissionGate::new(state, MOVIES_READ),
                require_permission,
            )),
        )
}

//! Demo endpoints served behind the pipeline.
//!
//! - `GET /v1/healthcheck` - Public liveness check
//! - `GET /v1/users/me` - The caller's account (activated users)
//! - `GET /v1/movies` - Placeholder listing (`movies:read`)

use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::identity::{Identity, User};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct MoviesResponse {
    pub movies: Vec<String>,
    pub requested_by: i64,
}

/// Always 200 while the process is serving.
pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[instrument(skip_all)]
pub async fn current_user(identity: Identity) -> AppResult<Json<User>> {
    let user = identity.user().ok_or(AppError::AuthenticationRequired)?;
    Ok(Json(user.clone()))
}

#[instrument(skip_all)]
pub async fn list_movies(identity: Identity) -> AppResult<Json<MoviesResponse>> {
    let user = identity.user().ok_or(AppError::AuthenticationRequired)?;
    Ok(Json(MoviesResponse {
        movies: Vec::new(),
        requested_by: user.id,
    }))
}

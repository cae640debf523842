//! Authorization gates.
//!
//! Per-route checks that read the [`Identity`] set by the authentication
//! layer and either forward or reject. Stack them outermost first in the
//! order authenticated → activated → permission:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/v1/movies", get(list_movies))
//!     .route_layer(from_fn_with_state(
//!         PermissionGate::new(&state, "movies:read"),
//!         require_permission,
//!     ))
//! ```
//!
//! Each gate also enforces the gates before it, so a route guarded only by
//! [`require_permission`] still answers anonymous callers with 401 and
//! inactive accounts with 403. Gates never modify the identity.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::identity::{Identity, User};
use crate::state::AppState;
use crate::store::PermissionLookup;

/// Reject anonymous callers with 401.
pub async fn require_authenticated_user(
    identity: Identity,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    authenticated(&identity)?;
    Ok(next.run(request).await)
}

/// Reject anonymous callers with 401 and inactive accounts with 403.
pub async fn require_activated_user(
    identity: Identity,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    activated(&identity)?;
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: the required code and where to look it up.
#[derive(Clone)]
pub struct PermissionGate {
    code: Arc<str>,
    permissions: Arc<dyn PermissionLookup>,
}

impl PermissionGate {
    pub fn new(state: &AppState, code: &str) -> Self {
        Self::with_lookup(state.permissions.clone(), code)
    }

    pub fn with_lookup(permissions: Arc<dyn PermissionLookup>, code: &str) -> Self {
        Self {
            code: Arc::from(code),
            permissions,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Require an activated user holding the gate's permission code.
///
/// Lookup failures answer 500; a missing code answers 403.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    identity: Identity,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    let user = activated(&identity)?;

    let permissions = gate.permissions.get_all_for_user(user.id).await?;
    if !permissions.includes(gate.code()) {
        warn!(user_id = user.id, permission = gate.code(), "Permission denied");
        return Err(AppError::NotPermitted(gate.code().to_string()));
    }

    debug!(user_id = user.id, permission = gate.code(), "Permission granted");
    Ok(next.run(request).await)
}

fn authenticated(identity: &Identity) -> AppResult<&User> {
    identity.user().ok_or(AppError::AuthenticationRequired)
}

fn activated(identity: &Identity) -> AppResult<&User> {
    let user = authenticated(identity)?;
    if !user.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

//! Request-scoped identity.
//!
//! The authentication layer resolves every request to exactly one
//! [`Identity`] and stores it in the request extensions. Downstream gates and
//! handlers only ever read it:
//!
//! ```rust,ignore
//! async fn me(identity: Identity) -> impl IntoResponse {
//!     match identity.user() {
//!         Some(user) => Json(user.clone()).into_response(),
//!         None => StatusCode::UNAUTHORIZED.into_response(),
//!     }
//! }
//! ```
//!
//! A request whose slot was never written reads as [`Identity::Anonymous`].

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Extensions;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A resolved user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub activated: bool,
    pub version: i32,
}

impl User {
    /// Minimal user for tests and demo seeding.
    pub fn new(id: i64, name: impl Into<String>, email: impl Into<String>, activated: bool) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            name: name.into(),
            email: email.into(),
            activated,
            version: 1,
        }
    }
}

/// Who is making the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    /// No credential was presented.
    #[default]
    Anonymous,
    /// A bearer token resolved to this user.
    Authenticated(Arc<User>),
}

impl Identity {
    /// The resolved user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user.as_ref()),
        }
    }

    /// Read the identity slot of a set of extensions.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        extensions.get::<Identity>().cloned().unwrap_or_default()
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity::Authenticated(Arc::new(user))
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity::from_extensions(&parts.extensions))
    }
}

/// Permission codes granted to a user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

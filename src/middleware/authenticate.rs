//! Bearer token authentication middleware.
//!
//! Resolves every request to an [`Identity`] and stores it in the request
//! extensions before calling the next layer:
//!
//! | `Authorization` header              | Outcome                         |
//! |-------------------------------------|---------------------------------|
//! | absent or empty                     | `Anonymous`, forwarded          |
//! | not `Bearer <token>`                | 401                             |
//! | token not exactly 26 bytes          | 401                             |
//! | token unknown or expired            | 401                             |
//! | lookup backend failure              | 500                             |
//! | token resolves to a user            | `Authenticated(user)`, forwarded|
//!
//! Every response leaving this layer carries `Vary: Authorization`, since
//! its content depends on that header. 401 responses also carry
//! `WWW-Authenticate: Bearer`.
//!
//! This is the only layer that writes the identity slot.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, HeaderValue, VARY};
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::state::AppState;
use crate::store::UserLookup;

/// Scheme prefix expected at the start of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Length in bytes of a plaintext token.
pub const TOKEN_LENGTH: usize = 26;

/// Authentication layer for Tower middleware stack.
#[derive(Clone)]
pub struct AuthenticateLayer {
    users: Arc<dyn UserLookup>,
}

impl AuthenticateLayer {
    pub fn new(state: &AppState) -> Self {
        Self::with_lookup(state.users.clone())
    }

    pub fn with_lookup(users: Arc<dyn UserLookup>) -> Self {
        Self { users }
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateService {
            inner,
            users: self.users.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthenticateService<S> {
    inner: S,
    users: Arc<dyn UserLookup>,
}

impl<S> Service<Request<Body>> for AuthenticateService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let users = self.users.clone();
        let mut inner = self.inner.clone();

        // Parsed before the future so no borrow of the request spans an await
        let presented = bearer_token(req.headers());

        Box::pin(async move {
            let resolved = match presented {
                Ok(None) => Ok(Identity::Anonymous),
                Ok(Some(token)) => resolve_token(users.as_ref(), &token).await,
                Err(e) => Err(e),
            };

            let mut response = match resolved {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await?
                }
                Err(e) => e.into_response(),
            };

            add_vary_authorization(response.headers_mut());
            Ok(response)
        })
    }
}

/// Extract the plaintext token from the `Authorization` header.
///
/// `Ok(None)` when the header is absent or empty.
fn bearer_token(headers: &HeaderMap) -> AppResult<Option<String>> {
    let Some(value) = headers.get(AUTHORIZATION).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::InvalidAuthenticationToken)?;
    let rest = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AppError::InvalidAuthenticationToken)?;

    let mut parts = rest.split_whitespace();
    let (Some(token), None) = (parts.next(), parts.next()) else {
        return Err(AppError::InvalidAuthenticationToken);
    };

    if !is_valid_token_plaintext(token) {
        debug!(len = token.len(), "Rejecting malformed bearer token");
        return Err(AppError::InvalidAuthenticationToken);
    }

    Ok(Some(token.to_string()))
}

/// Tokens are exactly [`TOKEN_LENGTH`] bytes.
pub fn is_valid_token_plaintext(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
}

async fn resolve_token(users: &dyn UserLookup, token: &str) -> AppResult<Identity> {
    match users.get_for_token(token).await? {
        Some(user) => {
            debug!(user_id = user.id, "Bearer token authenticated");
            Ok(Identity::from(user))
        }
        None => Err(AppError::InvalidAuthenticationToken),
    }
}

pub(crate) fn add_vary_authorization(headers: &mut HeaderMap) {
    let present = headers.get_all(VARY).iter().any(|v| {
        v.to_str().is_ok_and(|s| {
            s.split(',')
                .any(|item| item.trim().eq_ignore_ascii_case("authorization"))
        })
    });
    if !present {
        headers.append(VARY, HeaderValue::from_static("Authorization"));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    use crate::error::StoreError;
    use crate::identity::User;
    use crate::store::StoreFuture;

    const KNOWN_TOKEN: &str = "eyJhbGciO.eyJzNTY3ODI.SflK";
    const FAILING_TOKEN: &str = "non_ex_token.unexpec_error";

    struct StubUsers;

    impl UserLookup for StubUsers {
        fn get_for_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<User>> {
            Box::pin(async move {
                match token {
                    KNOWN_TOKEN => Ok(Some(User::new(1, "John Doe", "john@example.test", true))),
                    FAILING_TOKEN => Err(StoreError::Unavailable("connection refused".into())),
                    _ => Ok(None),
                }
            })
        }
    }

    /// Responds 200 with "anonymous" or the user id.
    async fn who(identity: Identity) -> String {
        match identity.user() {
            Some(user) => user.id.to_string(),
            None => "anonymous".to_string(),
        }
    }

    async fn send(header: Option<&str>) -> (StatusCode, HeaderMap, String) {
        let app = Router::new()
            .route("/", get(who))
            .layer(AuthenticateLayer::with_lookup(Arc::new(StubUsers)));

        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_without_header_is_anonymous() {
        let (status, headers, body) = send(None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
        assert_eq!(headers[VARY], "Authorization");
    }

    #[tokio::test]
    async fn test_empty_header_is_anonymous() {
        let (status, headers, body) = send(Some("")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
        assert_eq!(headers[VARY], "Authorization");
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let (status, headers, body) = send(Some(&format!("Bearer {KNOWN_TOKEN}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "1");
        assert_eq!(headers[VARY], "Authorization");
    }

    #[tokio::test]
    async fn test_missing_bearer_prefix() {
        let (status, headers, _) = send(Some(KNOWN_TOKEN)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers["www-authenticate"], "Bearer");
        assert_eq!(headers[VARY], "Authorization");
    }

    #[tokio::test]
    async fn test_wrong_scheme() {
        let (status, _, _) = send(Some(&format!("Basic {KNOWN_TOKEN}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_wrong_length() {
        let (status, _, _) = send(Some("Bearer eyJhbGciO.eyJzNTY3ODI.SflKsG")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_more_than_one_token() {
        let (status, _, _) = send(Some(&format!("Bearer {KNOWN_TOKEN} extra"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_bearer() {
        let (status, _, _) = send(Some("Bearer ")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (status, _, _) = send(Some("Bearer non_ex_token.DIDgtWaS.SflK")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_500() {
        let (status, headers, _) = send(Some(&format!("Bearer {FAILING_TOKEN}"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers[VARY], "Authorization");
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).unwrap().is_none());

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {KNOWN_TOKEN}")).unwrap(),
        );
        assert_eq!(bearer_token(&headers).unwrap().as_deref(), Some(KNOWN_TOKEN));
    }

    #[test]
    fn test_vary_not_duplicated() {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Accept-Encoding, authorization"));
        add_vary_authorization(&mut headers);
        assert_eq!(headers.get_all(VARY).iter().count(), 1);

        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
        add_vary_authorization(&mut headers);
        assert_eq!(headers.get_all(VARY).iter().count(), 2);
    }
}

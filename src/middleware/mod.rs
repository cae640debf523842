//! HTTP middleware for the request pipeline.
//!
//! - **Panic Recovery**: Downstream panics become 500 with `Connection: close`
//! - **Rate Limiting**: Per-client token buckets keyed by peer host
//! - **Authentication**: `Authorization: Bearer <token>` resolved to an [`Identity`]
//! - **Authorization**: Per-route authenticated / activated / permission gates
//! - **Metrics**: Response time and status per request
//!
//! # Architecture
//!
//! ```text
//! Request → Recovery → Rate Limiter → Authenticate → Gates → Handler
//!              ↓             ↓              ↓           ↓
//!          500 panic     429 / 500      401 / 500   401 / 403 / 500
//! ```
//!
//! Every layer either forwards the request unchanged or answers it itself;
//! none does both.
//!
//! [`Identity`]: crate::identity::Identity

pub mod authenticate;
pub mod authorize;
pub mod ip;
pub mod rate_limit;
pub mod recover;
pub mod registry;
pub mod status;

pub use authenticate::{AuthenticateLayer, BEARER_PREFIX, TOKEN_LENGTH};
pub use authorize::{
    PermissionGate, require_activated_user, require_authenticated_user, require_permission,
};
pub use ip::{TrustedProxies, client_id};
pub use rate_limit::RateLimitLayer;
pub use recover::{PanicResponder, recover_panic};
pub use registry::{ClientRegistry, quota_for};
pub use status::{MetricsLayer, StatusRecorder};

//! Panic recovery.
//!
//! Wraps the pipeline in `tower_http`'s `CatchPanic`, which polls the inner
//! service inside `catch_unwind` on every call, so a panic in any downstream
//! layer or handler (sync or async) is intercepted. The panic becomes a
//! `500` JSON response carrying `Connection: close`, which makes the server
//! drop the connection instead of reusing it. It also carries
//! `Vary: Authorization`, which a panic skips past in the authentication layer.
//!
//! Panics only unwind when the binary is built with `panic = "unwind"`.

use std::any::Any;

use axum::body::Body;
use axum::http::Response;
use axum::http::header::{CONNECTION, HeaderValue};
use axum::response::IntoResponse;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};

use crate::error::AppError;
use crate::middleware::authenticate::add_vary_authorization;

/// Builds the response sent in place of a panicking request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicResponder;

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let detail = panic_message(err.as_ref());

        // Logged by AppError::into_response
        let mut response = AppError::Internal(format!("handler panicked: {detail}")).into_response();
        response
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
        add_vary_authorization(response.headers_mut());
        response
    }
}

/// Outermost pipeline layer.
pub fn recover_panic() -> CatchPanicLayer<PanicResponder> {
    CatchPanicLayer::custom(PanicResponder)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

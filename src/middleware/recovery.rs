//! Panic recovery: a panicking handler answers with the 500 envelope.

use std::any::Any;

use axum::{http::StatusCode, response::Response};
use tower_http::catch_panic::CatchPanicLayer;

use crate::response::{code, envelope};

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

pub fn recovery_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };

    tracing::error!(panic = %detail, "handler panicked");

    envelope::<()>(
        StatusCode::INTERNAL_SERVER_ERROR,
        code::SERVER_ERROR,
        "An internal error occurred",
        None,
    )
}

//! Extractors whose rejections render as the uniform error envelope.
//!
//! Axum's stock `Json`, `Query` and `Path` reject with plain-text bodies;
//! these wrappers route the rejection through [`AppError`] instead so that
//! malformed input answers with business code 1001.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

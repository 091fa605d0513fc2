//! HTTP middleware components.
//!
//! Middleware run before route handlers. They can:
//! - Authenticate requests and enforce roles
//! - Tag requests with a trace id
//! - Turn panics into error envelopes

/// JWT authentication and role guard
pub mod auth;
/// Cross-origin resource sharing
pub mod cors;
/// Panic recovery
pub mod recovery;
/// `X-Trace-ID` propagation
pub mod trace_id;

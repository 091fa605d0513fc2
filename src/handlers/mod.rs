//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives request data through the envelope-aware extractors
//! 2. Delegates to a service
//! 3. Wraps the result in [`crate::response::ApiResponse`]

/// AI chat and streaming chat
pub mod ai;
/// Login, registration, profile and admin endpoints
pub mod auth;
/// Liveness check
pub mod health;
/// Home content cards
pub mod home;
/// Webhook management and callbacks
pub mod webhooks;

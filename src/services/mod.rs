//! Business logic services.
//!
//! Services contain the business rules separated from HTTP handlers.
//! They validate input, run the SQL and own cache side effects.

pub mod ai;
pub mod auth_service;
pub mod home_service;
pub mod webhook_service;

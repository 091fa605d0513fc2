//! Data models representing database entities and API payloads.
//!
//! Request types carry a `validate` method mirroring the field rules of the
//! endpoint; handlers call it before touching the service layer.

/// Home content cards
pub mod home;
/// Page/page size normalization and paged results
pub mod pagination;
/// User accounts, credentials and profile payloads
pub mod user;
/// Webhook registrations, signing and callbacks
pub mod webhook;

use crate::error::AppError;

/// Require `value` to be between `min` and `max` characters long.
pub(crate) fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min {
        return Err(AppError::invalid(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(AppError::invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Same as [`check_len`] for optional fields; `None` always passes.
pub(crate) fn check_opt_len(
    field: &str,
    value: Option<&str>,
    min: usize,
    max: usize,
) -> Result<(), AppError> {
    match value {
        Some(value) => check_len(field, value, min, max),
        None => Ok(()),
    }
}

/// Map an `enabled`/`status` flag to its stored 1/0 form.
pub(crate) fn flag(value: bool) -> i16 {
    if value { 1 } else { 0 }
}

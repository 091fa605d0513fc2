//! User account models.
//!
//! # Security
//!
//! - `password_hash` is a bcrypt hash and is never serialized
//! - Email is unique when present; empty strings are stored as NULL

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{check_len, check_opt_len};
use crate::error::AppError;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

pub const STATUS_ACTIVE: i16 = 1;

/// Registered user.
///
/// # Database Table
///
/// Maps to the `users` table. Rows with `deleted_at` set are treated as absent.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Roles carried in issued access tokens.
    pub fn roles(&self) -> Vec<String> {
        vec![self.role.clone()]
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        check_len("username", &self.username, 3, 50)?;
        if self.password.chars().count() < 6 {
            return Err(AppError::invalid("password must be at least 6 characters"));
        }
        Ok(())
    }
}

/// Request to create a new account.
///
/// # Example
///
/// ```json
/// {
///   "username": "alice",
///   "password": "secret123",
///   "email": "alice@example.com"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl RegisterRequest {
    /// Validate and drop blank optional fields.
    pub fn validate(mut self) -> Result<Self, AppError> {
        check_len("username", &self.username, 3, 50)?;
        check_len("password", &self.password, 6, 20)?;

        self.email = non_blank(self.email);
        self.phone = non_blank(self.phone);
        self.nickname = non_blank(self.nickname);

        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }
        check_opt_len("nickname", self.nickname.as_deref(), 1, 50)?;

        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Partial profile update. At least one field must be present.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.email.is_none()
            && self.phone.is_none()
            && self.nickname.is_none()
            && self.avatar.is_none()
        {
            return Err(AppError::invalid("no fields to update"));
        }

        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            validate_email(email)?;
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.is_empty()) {
            validate_phone(phone)?;
        }
        check_opt_len("nickname", self.nickname.as_deref(), 0, 50)?;
        check_opt_len("avatar", self.avatar.as_deref(), 0, 255)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.old_password.is_empty() {
            return Err(AppError::invalid("old_password is required"));
        }
        check_len("new_password", &self.new_password, 6, 20)
    }
}

/// Successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = email.len() <= 100
        && !email.contains(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            });

    if !valid {
        return Err(AppError::invalid("email format is invalid"));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), AppError> {
    if phone.len() != 11 || !phone.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::invalid("phone must be 11 digits"));
    }
    Ok(())
}

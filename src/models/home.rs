//! Home page content cards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{check_len, check_opt_len};
use crate::error::AppError;

pub const STATUS_ENABLED: i16 = 1;

/// Number of demo rows inserted by the seed endpoint.
pub const SEED_COUNT: i32 = 30;

/// Content card shown on the home page.
///
/// # Database Table
///
/// Maps to the `home` table. Cards are listed `sort ASC, id DESC`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Home {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub link: String,
    pub sort: i32,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `?keyword=&page=&page_size=` for the search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl SearchQuery {
    /// Trimmed keyword, required and at most 100 characters.
    pub fn keyword(&self) -> Result<&str, AppError> {
        let keyword = self.keyword.as_deref().map(str::trim).unwrap_or_default();
        if keyword.is_empty() {
            return Err(AppError::invalid("keyword is required"));
        }
        check_len("keyword", keyword, 1, 100)?;
        Ok(keyword)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateHomeRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub sort: Option<i32>,
    #[serde(default)]
    pub status: Option<i16>,
}

impl CreateHomeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        check_len("title", self.title.trim(), 1, 200)?;
        check_opt_len("description", self.description.as_deref(), 0, 500)?;
        check_opt_len("image_url", self.image_url.as_deref(), 0, 500)?;
        check_opt_len("link", self.link.as_deref(), 0, 500)?;
        validate_sort_status(self.sort, self.status)
    }
}

/// Partial update of a card. At least one field must be present.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateHomeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub sort: Option<i32>,
    pub status: Option<i16>,
}

impl UpdateHomeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::invalid("no fields to update"));
        }
        check_opt_len("title", self.title.as_deref().map(str::trim), 1, 200)?;
        check_opt_len("description", self.description.as_deref(), 0, 500)?;
        check_opt_len("image_url", self.image_url.as_deref(), 0, 500)?;
        check_opt_len("link", self.link.as_deref(), 0, 500)?;
        validate_sort_status(self.sort, self.status)
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
            && self.link.is_none()
            && self.sort.is_none()
            && self.status.is_none()
    }
}

fn validate_sort_status(sort: Option<i32>, status: Option<i16>) -> Result<(), AppError> {
    if sort.is_some_and(|s| s < 0) {
        return Err(AppError::invalid("sort must not be negative"));
    }
    if status.is_some_and(|s| s != 0 && s != 1) {
        return Err(AppError::invalid("status must be 0 or 1"));
    }
    Ok(())
}

/// Turn a user keyword into a `LIKE` pattern that matches it literally.
///
/// `\`, `%` and `_` are escaped with a backslash, which is the default
/// escape character for PostgreSQL `LIKE`/`ILIKE`.
pub fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Demo card number `n` (1-based) for the seed endpoint.
pub fn seed_card(n: i32) -> CreateHomeRequest {
    CreateHomeRequest {
        title: format!("Home content title {n}"),
        description: Some(format!(
            "Description of home content item {n}, shown in the home list"
        )),
        image_url: Some(format!("https://picsum.photos/400/300?random={n}")),
        link: Some(format!("https://example.com/detail/{n}")),
        sort: Some(n),
        status: Some(STATUS_ENABLED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn keyword_is_trimmed_and_required() {
        let query = |k: Option<&str>| SearchQuery {
            keyword: k.map(str::to_string),
            page: None,
            page_size: None,
        };

        assert_eq!(query(Some("  news ")).keyword().unwrap(), "news");
        assert!(query(Some("   ")).keyword().is_err());
        assert!(query(None).keyword().is_err());
        assert!(query(Some(&"k".repeat(101))).keyword().is_err());
    }

    #[test]
    fn update_requires_a_field() {
        assert!(UpdateHomeRequest::default().validate().is_err());

        let req = UpdateHomeRequest {
            sort: Some(3),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_rejects_bad_sort_and_status() {
        let req = UpdateHomeRequest {
            sort: Some(-1),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateHomeRequest {
            status: Some(2),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_rejects_blank_title() {
        let mut req = seed_card(1);
        req.title = "   ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn seed_cards_are_valid_and_ordered() {
        for n in 1..=SEED_COUNT {
            let card = seed_card(n);
            assert!(card.validate().is_ok());
            assert_eq!(card.sort, Some(n));
        }
    }
}

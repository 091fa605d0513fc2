//! CORS layer built from `CORS_ALLOWED_ORIGINS` / `CORS_ALLOW_CREDENTIALS`.

use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{config::Config, middleware::trace_id::TRACE_ID_HEADER};

const METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

fn allowed_headers() -> [HeaderName; 4] {
    [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        TRACE_ID_HEADER,
        HeaderName::from_static("x-webhook-signature"),
    ]
}

/// `None` when no origin is configured: no CORS headers are sent.
///
/// `*` allows any origin, except with credentials, where the wildcard is
/// dropped and only explicit origins remain.
pub fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origins = config.cors_origins();
    let wildcard = origins.iter().any(|o| o == "*");

    let explicit: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods(METHODS)
        .allow_headers(allowed_headers())
        .expose_headers([TRACE_ID_HEADER]);

    if config.cors_allow_credentials {
        if explicit.is_empty() {
            if wildcard {
                tracing::warn!("CORS wildcard origin ignored because credentials are allowed");
            }
            return None;
        }
        return Some(
            layer
                .allow_origin(AllowOrigin::list(explicit))
                .allow_credentials(true),
        );
    }

    if wildcard {
        return Some(layer.allow_origin(Any));
    }
    if explicit.is_empty() {
        return None;
    }
    Some(layer.allow_origin(AllowOrigin::list(explicit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(origins: &str, credentials: bool) -> Config {
        let mut config = Config::for_tests();
        config.cors_allowed_origins = origins.to_string();
        config.cors_allow_credentials = credentials;
        config
    }

    #[test]
    fn no_origins_means_no_layer() {
        assert!(cors_layer(&config("", false)).is_none());
    }

    #[test]
    fn wildcard_or_list_builds_a_layer() {
        assert!(cors_layer(&config("*", false)).is_some());
        assert!(cors_layer(&config("https://a.example", false)).is_some());
    }

    #[test]
    fn wildcard_is_dropped_with_credentials() {
        assert!(cors_layer(&config("*", true)).is_none());
        assert!(cors_layer(&config("*,https://a.example", true)).is_some());
    }
}

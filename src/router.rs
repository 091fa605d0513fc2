//! Route table and middleware stack.
//!
//! Layers, outermost first: trace id, panic recovery, request logging, CORS.
//! Recovery sits inside the trace id scope so a panic still answers with the
//! caller's trace id.
//! Protected groups additionally run [`jwt_auth`]; admin routes also run
//! [`require_admin`].

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::{self as axum_middleware},
    routing::{delete, get, post},
};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{
    config::Config,
    error::AppError,
    handlers::{ai, auth, health, home, webhooks},
    middleware::{
        auth::{jwt_auth, require_admin},
        cors::cors_layer,
        recovery::recovery_layer,
        trace_id::{TraceId, trace_id},
    },
    state::AppState,
};

async fn route_not_found() -> AppError {
    AppError::not_found("route not found")
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("method not allowed".to_string())
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    let trace_id = request
        .extensions()
        .get::<TraceId>()
        .map(|id| id.0.as_str())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        trace_id = %trace_id,
    )
}

/// Build the application router.
///
/// AI routes are only mounted when `state.ai` is present.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/user/admin/list", get(auth::admin_list))
        .route_layer(axum_middleware::from_fn(require_admin));

    let mut protected = Router::new()
        // Account
        .route(
            "/api/user/profile",
            get(auth::profile).put(auth::update_profile),
        )
        .route("/api/user/change-password", post(auth::change_password))
        .route("/api/user/logout", post(auth::logout))
        // Home content
        .route("/api/home/list", get(home::list))
        .route("/api/home/search", get(home::search))
        .route("/api/home/create", post(home::create))
        .route("/api/home/seed", post(home::seed))
        .route("/api/home/update/{id}", post(home::update))
        .route("/api/home/delete/{id}", delete(home::delete))
        // Webhooks
        .route("/api/webhook/create", post(webhooks::create_webhook))
        .route("/api/webhook/update", post(webhooks::update_webhook))
        .route("/api/webhook/delete/{id}", delete(webhooks::delete_webhook))
        .route("/api/webhook/detail/{id}", get(webhooks::webhook_detail))
        .route("/api/webhook/list", get(webhooks::list_webhooks))
        .route("/api/webhook/sign", post(webhooks::sign_payload))
        .merge(admin);

    if state.ai.is_some() {
        protected = protected
            .route("/api/ai/chat", post(ai::chat))
            .route("/api/ai/chat2", post(ai::chat_stream));
    } else {
        tracing::info!("AI service disabled, /api/ai routes not mounted");
    }

    let protected = protected.route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        jwt_auth,
    ));

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/user/login", post(auth::login))
        .route("/api/user/register", post(auth::register))
        .route("/api/user/refresh", post(auth::refresh))
        .route("/api/webhook/callback/{secret}", post(webhooks::callback))
        .merge(protected)
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed);

    with_middleware(router, &state.config).with_state(state)
}

/// Wrap `router` in the shared middleware stack.
fn with_middleware(mut router: Router<AppState>, config: &Config) -> Router<AppState> {
    if let Some(cors) = cors_layer(config) {
        router = router.layer(cors);
    }

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(recovery_layer())
        .layer(axum_middleware::from_fn(trace_id))
}

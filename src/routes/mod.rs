pub mod auth;
pub mod health;
pub mod openai;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::AppState;
use crate::error::ProxyError;

/// Build the HTTP surface: chat completions, model listing, health.
///
/// Chat and model routes are served both under `/v1` and at the root.
/// Every response carries permissive CORS headers and any `OPTIONS`
/// request is answered as a preflight. Request bodies are not size-limited.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route(
            "/chat/completions",
            post(openai::chat_completions)
                .options(preflight)
                .fallback(not_found),
        )
        .route(
            "/models",
            get(openai::list_models)
                .options(preflight)
                .fallback(not_found),
        );

    Router::new()
        .route(
            "/health",
            get(health::health).options(preflight).fallback(not_found),
        )
        .merge(api_routes.clone())
        .nest("/v1", api_routes)
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> ProxyError {
    ProxyError::NotFound
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        ProxyError::NotFound.into_response()
    }
}

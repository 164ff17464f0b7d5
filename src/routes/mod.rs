use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    routing::get,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir};

use crate::{
    config::AppConfig, error::ErrorData, response::ApiResponse, services::upload_service,
    state::AppState,
};

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod doc;
pub mod extract;
pub mod health;
pub mod orders;
pub mod params;
pub mod products;
pub mod reviews;
pub mod seller;
pub mod track;
pub mod uploads;

/// Headroom over the upload limit for multipart framing and JSON bodies.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/account", account::router())
        .nest("/products", products::router())
        .nest("/reviews", reviews::router())
        .nest("/cart", cart::router())
        .nest("/checkout", checkout::checkout_router())
        .nest("/payments", checkout::payments_router())
        .nest("/webhooks", checkout::webhooks_router())
        .nest("/orders", orders::route())
        .nest("/seller", seller::router())
        .nest("/uploads", uploads::router(config.max_upload_bytes))
        .nest("/track", track::router())
        .nest("/privacy", track::privacy_router())
        .nest("/admin", admin::router())
}

/// Everything served by the binary apart from tracing and request-id layers.
pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router(&config))
        .nest_service(
            upload_service::MEDIA_PREFIX,
            ServeDir::new(&config.upload_root),
        )
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(
            config.max_upload_bytes + BODY_LIMIT_SLACK,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<ErrorData>>) {
    tracing::debug!(path = %uri.path(), "no route");
    let body = ApiResponse::failure(
        "Not Found",
        ErrorData {
            error: "not_found".to_string(),
        },
    );
    (StatusCode::NOT_FOUND, Json(body))
}

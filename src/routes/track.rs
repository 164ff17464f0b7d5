use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};

use crate::{
    dto::analytics::{
        PrivacyDeleted, PrivacyExport, TrackInteractionRequest, TrackViewRequest, Tracked,
    },
    error::AppResult,
    middleware::auth::{AuthUser, MaybeAuthUser},
    response::ApiResponse,
    routes::extract::AppJson,
    services::analytics_service::{self, ViewContext},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/view", post(track_view))
        .route("/interaction", post(track_interaction))
}

pub fn privacy_router() -> Router<AppState> {
    Router::new()
        .route("/export", get(export_tracking_data))
        .route("/delete", post(delete_tracking_data))
}

#[utoipa::path(
    post,
    path = "/api/track/view",
    request_body = TrackViewRequest,
    responses(
        (status = 202, description = "View recorded", body = ApiResponse<Tracked>),
        (status = 400, description = "Missing session or path")
    ),
    tag = "Tracking"
)]
pub async fn track_view(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    headers: HeaderMap,
    AppJson(payload): AppJson<TrackViewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Tracked>>)> {
    let ctx = ViewContext::from_headers(&headers, &caller);
    let resp = analytics_service::track_view(&state, ctx, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/track/interaction",
    request_body = TrackInteractionRequest,
    responses(
        (status = 202, description = "Interaction recorded", body = ApiResponse<Tracked>),
        (status = 400, description = "Missing session or event type")
    ),
    tag = "Tracking"
)]
pub async fn track_interaction(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    AppJson(payload): AppJson<TrackInteractionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Tracked>>)> {
    let resp = analytics_service::track_interaction(&state, &caller, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/privacy/export",
    responses(
        (status = 200, description = "Caller's view and interaction events", body = ApiResponse<PrivacyExport>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Tracking"
)]
pub async fn export_tracking_data(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PrivacyExport>>> {
    let resp = analytics_service::export_own_events(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/privacy/delete",
    responses(
        (status = 200, description = "Caller's tracking events erased", body = ApiResponse<PrivacyDeleted>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Tracking"
)]
pub async fn delete_tracking_data(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PrivacyDeleted>>> {
    let resp = analytics_service::delete_own_events(&state, &user).await?;
    Ok(Json(resp))
}

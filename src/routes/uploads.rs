use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    routing::post,
};

use crate::{
    dto::uploads::UploadedImage,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::upload_service,
    state::AppState,
};

/// Multipart framing overhead allowed on top of the file itself.
const MULTIPART_SLACK: usize = 64 * 1024;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/image", post(upload_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_SLACK))
}

#[utoipa::path(
    post,
    path = "/api/uploads/image",
    request_body(content_type = "multipart/form-data", description = "Image in the `file` field"),
    responses(
        (status = 201, description = "Image stored and served under /media", body = ApiResponse<UploadedImage>),
        (status = 400, description = "Empty, oversized or unsupported file"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Uploads"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<UploadedImage>>)> {
    let resp = upload_service::upload_image(&state, &user, multipart?).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

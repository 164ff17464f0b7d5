use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get},
};

use crate::{
    dto::account::SellerApplicationRequest,
    error::AppResult,
    middleware::auth::AuthUser,
    models::SellerApplication,
    response::ApiResponse,
    routes::extract::AppJson,
    services::account_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", delete(delete_account)).route(
        "/seller-application",
        get(get_seller_application).post(apply_for_seller),
    )
}

#[utoipa::path(
    delete,
    path = "/api/account",
    responses(
        (status = 200, description = "Account anonymised and disabled", body = ApiResponse<serde_json::Value>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = account_service::delete_account(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/account/seller-application",
    request_body = SellerApplicationRequest,
    responses(
        (status = 201, description = "Application submitted", body = ApiResponse<SellerApplication>),
        (status = 409, description = "Already a seller or an application is pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn apply_for_seller(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<SellerApplicationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SellerApplication>>)> {
    let resp = account_service::apply_for_seller(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/account/seller-application",
    responses(
        (status = 200, description = "Latest seller application", body = ApiResponse<SellerApplication>),
        (status = 404, description = "No application")
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn get_seller_application(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SellerApplication>>> {
    let resp = account_service::get_seller_application(&state, &user).await?;
    Ok(Json(resp))
}

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::products::{
        CreateProductRequest, NewImage, NewVariant, ProductList, ProductRemoval,
        SellerTransaction, UpdateProductRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Product, ProductImage, Variant},
    response::ApiResponse,
    routes::{
        extract::{AppJson, AppPath, AppQuery},
        params::{Pagination, SellerProductQuery},
    },
    services::seller_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_own_products).post(create_product))
        .route("/products/{id}", patch(update_product).delete(delete_product))
        .route("/products/{id}/variants", post(add_variant))
        .route(
            "/products/{id}/variants/{variant_id}",
            delete(remove_variant),
        )
        .route("/products/{id}/images", post(add_image))
        .route("/transactions", get(list_transactions))
}

#[utoipa::path(
    get,
    path = "/api/seller/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("active" = Option<bool>, Query, description = "Filter by active flag")
    ),
    responses(
        (status = 200, description = "Caller's own products, active or not", body = ApiResponse<ProductList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn list_own_products(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(pagination): AppQuery<Pagination>,
    AppQuery(query): AppQuery<SellerProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = seller_service::list_own_products(&state, &user, pagination, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/seller/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created with its variants and images", body = ApiResponse<Product>),
        (status = 400, description = "Invalid product"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Duplicate sku or slug")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let resp = seller_service::create_product(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/seller/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<Product>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = seller_service::update_product(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/seller/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Deleted, or deactivated when orders reference it", body = ApiResponse<ProductRemoval>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<ProductRemoval>>> {
    let resp = seller_service::delete_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/seller/products/{id}/variants",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = NewVariant,
    responses(
        (status = 201, description = "Variant added", body = ApiResponse<Variant>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn add_variant(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<NewVariant>,
) -> AppResult<(StatusCode, Json<ApiResponse<Variant>>)> {
    let resp = seller_service::add_variant(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    delete,
    path = "/api/seller/products/{id}/variants/{variant_id}",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("variant_id" = Uuid, Path, description = "Variant ID")
    ),
    responses(
        (status = 200, description = "Variant removed", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn remove_variant(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath((id, variant_id)): AppPath<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = seller_service::remove_variant(&state, &user, id, variant_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/seller/products/{id}/images",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = NewImage,
    responses(
        (status = 201, description = "Image attached", body = ApiResponse<ProductImage>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn add_image(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<NewImage>,
) -> AppResult<(StatusCode, Json<ApiResponse<ProductImage>>)> {
    let resp = seller_service::add_image(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/seller/transactions",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Order lines for the caller's products", body = ApiResponse<Vec<SellerTransaction>>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Seller"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(pagination): AppQuery<Pagination>,
) -> AppResult<Json<ApiResponse<Vec<SellerTransaction>>>> {
    let resp = seller_service::list_transactions(&state, &user, pagination).await?;
    Ok(Json(resp))
}

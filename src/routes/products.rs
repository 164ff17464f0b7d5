use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        products::{ProductDetail, ProductList},
        reviews::{CreateReviewRequest, ReviewList},
    },
    error::AppResult,
    middleware::auth::{AuthUser, MaybeAuthUser},
    models::Review,
    response::ApiResponse,
    routes::{
        extract::{AppJson, AppPath, AppQuery},
        params::{Pagination, ProductQuery},
    },
    services::{analytics_service::ViewContext, catalog_service, review_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/slug/{slug}", get(get_product_by_slug))
        .route("/{id}", get(get_product))
        .route("/{id}/reviews", get(list_reviews).post(create_review))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search name, brand or sku"),
        ("brand" = Option<String>, Query, description = "Filter by brand"),
        ("category" = Option<String>, Query, description = "Filter by category"),
        ("size" = Option<String>, Query, description = "Only products with a variant in this size"),
        ("colour" = Option<String>, Query, description = "Only products with a variant in this colour"),
        ("min_price" = Option<i64>, Query, description = "Minimum price in minor units"),
        ("max_price" = Option<i64>, Query, description = "Maximum price in minor units"),
        ("sort" = Option<String>, Query, description = "newest, price_asc, price_desc")
    ),
    responses(
        (status = 200, description = "List active products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    AppQuery(pagination): AppQuery<Pagination>,
    AppQuery(query): AppQuery<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = catalog_service::list_products(&state, pagination, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product with variants, images and review summary", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Not Found")
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let ctx = ViewContext::from_headers(&headers, &caller);
    let resp = catalog_service::get_product(&state, ctx, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/slug/{slug}",
    params(("slug" = String, Path, description = "Product SEO slug")),
    responses(
        (status = 200, description = "Product by slug", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Not Found")
    ),
    tag = "Products"
)]
pub async fn get_product_by_slug(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    headers: HeaderMap,
    AppPath(slug): AppPath<String>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let ctx = ViewContext::from_headers(&headers, &caller);
    let resp = catalog_service::get_product_by_slug(&state, ctx, &slug).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/reviews",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Reviews, newest first, and whether the caller may review", body = ApiResponse<ReviewList>),
        (status = 404, description = "Not Found")
    ),
    tag = "Reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    AppPath(id): AppPath<Uuid>,
    AppQuery(pagination): AppQuery<Pagination>,
) -> AppResult<Json<ApiResponse<ReviewList>>> {
    let resp = review_service::list_reviews(&state, &caller, id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = ApiResponse<Review>),
        (status = 400, description = "Invalid rating, body or images"),
        (status = 403, description = "Product not purchased"),
        (status = 409, description = "Already reviewed")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Review>>)> {
    let resp = review_service::create_review(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

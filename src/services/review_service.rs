use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::reviews::{CreateReviewRequest, FlagReviewRequest, ReviewList, UpdateReviewRequest},
    entity::{
        OrderItems, Orders, Products, Reviews,
        order_items::Column as OrderItemCol,
        orders::{Column as OrderCol, OrderStatus},
        products::Column as ProdCol,
        review_flags::ActiveModel as FlagActive,
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, MaybeAuthUser, ensure_owner},
    models::{Review, ReviewFlag},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    sanitize::markdown_to_safe_html,
    state::AppState,
};

pub const MAX_BODY_CHARS: usize = 5000;
pub const MAX_IMAGES: usize = 6;

pub fn validate_rating(rating: i16) -> AppResult<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(AppError::BadRequest("rating must be between 1 and 5".into()))
    }
}

fn validate_body(body: &str) -> AppResult<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("review body is required".into()));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::BadRequest(format!(
            "review body is limited to {MAX_BODY_CHARS} characters"
        )));
    }
    Ok(body.to_string())
}

/// Review photos must be uploaded media or absolute https URLs.
pub fn validate_images(images: &[String]) -> AppResult<serde_json::Value> {
    if images.len() > MAX_IMAGES {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_IMAGES} images per review"
        )));
    }
    for url in images {
        if !(url.starts_with("/media/") || url.starts_with("https://")) {
            return Err(AppError::BadRequest(format!("unsupported image url: {url}")));
        }
    }
    Ok(serde_json::json!(images))
}

/// True when the user has an order line for the product on an order that
/// counts as purchased.
pub async fn has_purchased(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
    let count = OrderItems::find()
        .inner_join(Orders)
        .filter(OrderItemCol::ProductId.eq(product_id))
        .filter(OrderCol::UserId.eq(user_id))
        .filter(OrderCol::Status.is_in(OrderStatus::PURCHASED))
        .count(&state.orm)
        .await?;
    Ok(count > 0)
}

async fn already_reviewed(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
    let count = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .filter(ReviewCol::UserId.eq(user_id))
        .count(&state.orm)
        .await?;
    Ok(count > 0)
}

fn already_reviewed_error() -> AppError {
    AppError::conflict("already_reviewed", "You have already reviewed this product")
}

async fn ensure_product_exists(state: &AppState, product_id: Uuid) -> AppResult<()> {
    Products::find_by_id(product_id)
        .filter(ProdCol::Active.eq(true))
        .one(&state.orm)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound)
}

pub async fn list_reviews(
    state: &AppState,
    caller: &MaybeAuthUser,
    product_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    ensure_product_exists(state, product_id).await?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .order_by_desc(ReviewCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Review::from)
        .collect();

    let can_review = match caller.user_id() {
        Some(user_id) => {
            has_purchased(state, user_id, product_id).await?
                && !already_reviewed(state, user_id, product_id).await?
        }
        None => false,
    };

    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items, can_review },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    ensure_product_exists(state, product_id).await?;
    validate_rating(payload.rating)?;
    let body_md = validate_body(&payload.body_md)?;
    let images = validate_images(&payload.images)?;

    if !has_purchased(state, user.user_id, product_id).await? {
        return Err(AppError::denied(
            "purchase_required",
            "Only customers who bought this product can review it",
        ));
    }
    if already_reviewed(state, user.user_id, product_id).await? {
        return Err(already_reviewed_error());
    }

    let now = Utc::now();
    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        user_id: Set(user.user_id),
        rating: Set(payload.rating),
        body_html_sanitised: Set(markdown_to_safe_html(&body_md)),
        body_md: Set(body_md),
        images: Set(images),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await
    // Two concurrent submissions can both pass the check above.
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => already_reviewed_error(),
        _ => AppError::OrmError(err),
    })?;

    Ok(ApiResponse::success(
        "Review created",
        Review::from(review),
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let existing = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_owner(user, Some(existing.user_id))?;

    let mut active: ReviewActive = existing.into();
    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
        active.rating = Set(rating);
    }
    if let Some(body) = payload.body_md {
        let body_md = validate_body(&body)?;
        active.body_html_sanitised = Set(markdown_to_safe_html(&body_md));
        active.body_md = Set(body_md);
    }
    if let Some(images) = payload.images {
        active.images = Set(validate_images(&images)?);
    }
    active.updated_at = Set(Utc::now().into());

    let review = active.update(&state.orm).await?;
    Ok(ApiResponse::success(
        "Review updated",
        Review::from(review),
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_owner(user, Some(existing.user_id))?;

    Reviews::delete_by_id(id).exec(&state.orm).await?;

    if existing.user_id != user.user_id {
        audit::record(
            state,
            Some(user.user_id),
            "review_delete",
            "review",
            id,
            Some(serde_json::json!({ "author_id": existing.user_id })),
        )
        .await;
    }

    Ok(ApiResponse::success(
        "Review deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn flag_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: FlagReviewRequest,
) -> AppResult<ApiResponse<ReviewFlag>> {
    let reason = payload.reason.trim();
    if reason.is_empty() {
        return Err(AppError::BadRequest("reason is required".into()));
    }

    let review = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let flag = FlagActive {
        id: Set(Uuid::new_v4()),
        review_id: Set(review.id),
        flagged_by: Set(user.user_id),
        reason: Set(reason.chars().take(500).collect()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(review_id = %review.id, flagged_by = %user.user_id, "review flagged");

    Ok(ApiResponse::success(
        "Review flagged",
        ReviewFlag::from(flag),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratings_are_one_to_five() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn bodies_are_trimmed_and_bounded() {
        assert_eq!(validate_body("  nice  ").unwrap(), "nice");
        assert!(validate_body("   ").is_err());
        assert!(validate_body(&"x".repeat(MAX_BODY_CHARS + 1)).is_err());
    }

    #[test]
    fn image_urls_are_restricted() {
        assert!(validate_images(&["/media/a.png".into(), "https://cdn.example/b.jpg".into()]).is_ok());
        assert!(validate_images(&["javascript:alert(1)".into()]).is_err());
        assert!(validate_images(&["http://plain.example/c.png".into()]).is_err());
        assert!(validate_images(&vec!["/media/x.png".to_string(); MAX_IMAGES + 1]).is_err());
    }
}

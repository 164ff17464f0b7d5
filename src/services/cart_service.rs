use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartLine, CartView},
    entity::{
        CartItems, Products, Variants,
        cart_items::{ActiveModel as CartActive, Column as CartCol},
        products::Column as ProdCol,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
    services::checkout_service::MAX_LINE_QTY,
    state::AppState,
};

/// The caller's cart with current catalog prices. Prices here are for
/// display; checkout prices again from the catalog.
pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let lines = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let products: HashMap<Uuid, Product> = Products::find()
        .filter(ProdCol::Id.is_in(lines.iter().map(|l| l.product_id)))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|p| (p.id, Product::from(p)))
        .collect();

    let mut items = Vec::with_capacity(lines.len());
    let mut subtotal_cents: i64 = 0;
    let mut currency: Option<String> = None;
    for line in lines {
        let Some(product) = products.get(&line.product_id) else {
            continue;
        };
        let line_total_cents = product.price_cents.saturating_mul(i64::from(line.quantity));
        subtotal_cents = subtotal_cents.saturating_add(line_total_cents);
        currency.get_or_insert_with(|| product.currency.clone());
        items.push(CartLine {
            id: line.id,
            product: product.clone(),
            variant_id: line.variant_id,
            quantity: line.quantity,
            line_total_cents,
        });
    }

    Ok(ApiResponse::success(
        "Cart",
        CartView {
            items,
            subtotal_cents,
            currency,
        },
        Some(Meta::empty()),
    ))
}

/// Adds to an existing (product, variant) line or creates one.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 || payload.quantity > MAX_LINE_QTY {
        return Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_LINE_QTY}"
        )));
    }

    let product = Products::find_by_id(payload.product_id)
        .filter(ProdCol::Active.eq(true))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product is unknown or inactive".into()))?;

    if let Some(variant_id) = payload.variant_id {
        let variant = Variants::find_by_id(variant_id).one(&state.orm).await?;
        if variant.is_none_or(|v| v.product_id != product.id) {
            return Err(AppError::BadRequest(
                "variant does not belong to product".into(),
            ));
        }
    }

    let variant_filter = match payload.variant_id {
        Some(variant_id) => CartCol::VariantId.eq(variant_id),
        None => CartCol::VariantId.is_null(),
    };
    let existing = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.eq(product.id))
        .filter(variant_filter)
        .one(&state.orm)
        .await?;

    let item = match existing {
        Some(line) => {
            let quantity = (line.quantity + payload.quantity).min(MAX_LINE_QTY);
            let mut active: CartActive = line.into();
            active.quantity = Set(quantity);
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(product.id),
                variant_id: Set(payload.variant_id),
                quantity: Set(payload.quantity),
                created_at: Set(Utc::now().into()),
            }
            .insert(&state.orm)
            .await?
        }
    };

    Ok(ApiResponse::success(
        "Added to cart",
        CartItem::from(item),
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::Id.eq(item_id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({ "removed": result.rows_affected }),
        Some(Meta::empty()),
    ))
}

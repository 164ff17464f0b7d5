use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        CreateProductRequest, NewImage, NewVariant, ProductList, ProductRemoval,
        SellerTransaction, UpdateProductRequest,
    },
    entity::{
        OrderItems, Orders, ProductImages, Products, Variants,
        order_items::Column as OrderItemCol,
        orders::{Column as OrderCol, OrderStatus},
        product_images::{ActiveModel as ImageActive, Column as ImageCol},
        products::{ActiveModel as ProductActive, Column as ProdCol, Model as ProductModel},
        users::Role,
        variants::{ActiveModel as VariantActive, Column as VariantCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, authorize, ensure_owner},
    models::{Product, ProductImage, Variant},
    response::{ApiResponse, Meta},
    routes::params::{Pagination, SellerProductQuery},
    state::AppState,
};

/// Lowercase ASCII words joined by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn normalize_currency(currency: &str) -> AppResult<String> {
    let currency = currency.trim().to_uppercase();
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(currency)
    } else {
        Err(AppError::BadRequest(
            "currency must be a three-letter ISO code".into(),
        ))
    }
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn check_price(price_cents: i64) -> AppResult<()> {
    if price_cents < 0 {
        return Err(AppError::BadRequest("price_cents must not be negative".into()));
    }
    Ok(())
}

fn check_stock(stock: i32) -> AppResult<()> {
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

fn duplicate_as_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::conflict("duplicate_product", "SKU or slug is already in use")
        }
        _ => AppError::OrmError(err),
    }
}

async fn find_product(state: &AppState, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

/// Loads a product the caller may manage.
async fn owned_product(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ProductModel> {
    authorize(user, &[Role::Seller])?;
    let product = find_product(state, id).await?;
    ensure_owner(user, product.owner_id)?;
    Ok(product)
}

/// Creates a product with its variants and images. `owner_id = None` makes
/// it platform-owned.
pub async fn insert_product(
    state: &AppState,
    actor: &AuthUser,
    owner_id: Option<Uuid>,
    payload: CreateProductRequest,
) -> AppResult<Product> {
    let name = required(&payload.name, "name")?;
    let sku = required(&payload.sku, "sku")?;
    let brand = required(&payload.brand, "brand")?;
    let category = required(&payload.category, "category")?;
    check_price(payload.price_cents)?;
    for variant in &payload.variants {
        check_stock(variant.stock)?;
    }
    let currency = normalize_currency(
        payload
            .currency
            .as_deref()
            .unwrap_or(&state.config.default_currency),
    )?;

    let id = Uuid::new_v4();
    let seo_slug = match payload.seo_slug.as_deref().map(slugify) {
        Some(slug) if !slug.is_empty() => slug,
        _ => format!("{}-{}", slugify(&name), &id.simple().to_string()[..8]),
    };
    let hero_image_url = payload
        .hero_image_url
        .clone()
        .or_else(|| payload.images.first().map(|i| i.url.clone()));

    let txn = state.orm.begin().await?;

    let product = ProductActive {
        id: Set(id),
        owner_id: Set(owner_id),
        sku: Set(sku),
        name: Set(name),
        brand: Set(brand),
        category: Set(category),
        description_md: Set(payload.description_md),
        price_cents: Set(payload.price_cents),
        currency: Set(currency),
        active: Set(payload.active.unwrap_or(true)),
        seo_slug: Set(seo_slug),
        hero_image_url: Set(hero_image_url),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await
    .map_err(duplicate_as_conflict)?;

    for variant in payload.variants {
        variant_active(product.id, variant).insert(&txn).await?;
    }
    for (index, image) in payload.images.into_iter().enumerate() {
        image_active(product.id, image, index as i32)
            .insert(&txn)
            .await?;
    }

    txn.commit().await?;

    audit::record(
        state,
        Some(actor.user_id),
        "product_create",
        "product",
        product.id,
        Some(serde_json::json!({ "sku": product.sku, "owner_id": product.owner_id })),
    )
    .await;

    Ok(Product::from(product))
}

fn variant_active(product_id: Uuid, variant: NewVariant) -> VariantActive {
    VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        size: Set(variant.size),
        colour: Set(variant.colour),
        stock: Set(variant.stock),
        gtin: Set(variant.gtin),
    }
}

fn image_active(product_id: Uuid, image: NewImage, default_index: i32) -> ImageActive {
    ImageActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        url: Set(image.url),
        sort_index: Set(image.sort_index.unwrap_or(default_index)),
    }
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    authorize(user, &[Role::Seller])?;
    let product = insert_product(state, user, Some(user.user_id), payload).await?;
    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn list_own_products(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
    query: SellerProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    authorize(user, &[Role::Seller])?;
    let (page, limit, offset) = pagination.normalize();

    let mut condition = Condition::all();
    if user.role != Role::Admin {
        condition = condition.add(ProdCol::OwnerId.eq(user.user_id));
    }
    if let Some(active) = query.active {
        condition = condition.add(ProdCol::Active.eq(active));
    }

    let finder = Products::find()
        .filter(condition)
        .order_by_desc(ProdCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing = owned_product(state, user, id).await?;
    let mut active: ProductActive = existing.into();

    if let Some(name) = payload.name {
        active.name = Set(required(&name, "name")?);
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(required(&brand, "brand")?);
    }
    if let Some(category) = payload.category {
        active.category = Set(required(&category, "category")?);
    }
    if let Some(description_md) = payload.description_md {
        active.description_md = Set(description_md);
    }
    if let Some(price_cents) = payload.price_cents {
        check_price(price_cents)?;
        active.price_cents = Set(price_cents);
    }
    if let Some(currency) = payload.currency {
        active.currency = Set(normalize_currency(&currency)?);
    }
    if let Some(flag) = payload.active {
        active.active = Set(flag);
    }
    if let Some(slug) = payload.seo_slug {
        let slug = slugify(&slug);
        if slug.is_empty() {
            return Err(AppError::BadRequest("seo_slug is empty".into()));
        }
        active.seo_slug = Set(slug);
    }
    if let Some(url) = payload.hero_image_url {
        active.hero_image_url = Set(Some(url).filter(|u| !u.trim().is_empty()));
    }

    let product = active
        .update(&state.orm)
        .await
        .map_err(duplicate_as_conflict)?;

    audit::record(
        state,
        Some(user.user_id),
        "product_update",
        "product",
        product.id,
        None,
    )
    .await;

    Ok(ApiResponse::success(
        "Product updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Hard delete, unless order lines reference the product; then it is only
/// deactivated so order history stays intact.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<ProductRemoval>> {
    let product = owned_product(state, user, id).await?;

    let ordered = OrderItems::find()
        .filter(OrderItemCol::ProductId.eq(product.id))
        .count(&state.orm)
        .await?
        > 0;

    if ordered {
        let mut active: ProductActive = product.into();
        active.active = Set(false);
        active.update(&state.orm).await?;
    } else {
        Products::delete_by_id(id).exec(&state.orm).await?;
    }

    let action = if ordered {
        "product_deactivate"
    } else {
        "product_delete"
    };
    audit::record(state, Some(user.user_id), action, "product", id, None).await;

    let message = if ordered {
        "Product deactivated"
    } else {
        "Product deleted"
    };
    Ok(ApiResponse::success(
        message,
        ProductRemoval {
            id,
            deactivated: ordered,
        },
        Some(Meta::empty()),
    ))
}

pub async fn add_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: NewVariant,
) -> AppResult<ApiResponse<Variant>> {
    let product = owned_product(state, user, product_id).await?;
    check_stock(payload.stock)?;
    let variant = variant_active(product.id, payload)
        .insert(&state.orm)
        .await?;

    audit::record(
        state,
        Some(user.user_id),
        "variant_create",
        "product",
        product.id,
        Some(serde_json::json!({ "variant_id": variant.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Variant added",
        Variant::from(variant),
        Some(Meta::empty()),
    ))
}

pub async fn remove_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let product = owned_product(state, user, product_id).await?;
    let result = Variants::delete_many()
        .filter(VariantCol::Id.eq(variant_id))
        .filter(VariantCol::ProductId.eq(product.id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "variant_delete",
        "product",
        product.id,
        Some(serde_json::json!({ "variant_id": variant_id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Variant removed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn add_image(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: NewImage,
) -> AppResult<ApiResponse<ProductImage>> {
    let product = owned_product(state, user, product_id).await?;
    if payload.url.trim().is_empty() {
        return Err(AppError::BadRequest("url is required".into()));
    }

    let next_index = ProductImages::find()
        .filter(ImageCol::ProductId.eq(product.id))
        .count(&state.orm)
        .await? as i32;
    let image = image_active(product.id, payload, next_index)
        .insert(&state.orm)
        .await?;

    if product.hero_image_url.is_none() {
        let mut active: ProductActive = product.into();
        active.hero_image_url = Set(Some(image.url.clone()));
        active.update(&state.orm).await?;
    }

    Ok(ApiResponse::success(
        "Image added",
        ProductImage::from(image),
        Some(Meta::empty()),
    ))
}

/// Order lines for the caller's products (every product for admin).
pub async fn list_transactions(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<Vec<SellerTransaction>>> {
    authorize(user, &[Role::Seller])?;
    let (page, limit, offset) = pagination.normalize();

    let products: HashMap<Uuid, ProductModel> = {
        let mut finder = Products::find();
        if user.role != Role::Admin {
            finder = finder.filter(ProdCol::OwnerId.eq(user.user_id));
        }
        finder
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    if products.is_empty() {
        return Ok(ApiResponse::success(
            "Transactions",
            Vec::new(),
            Some(Meta::new(page, limit, 0)),
        ));
    }

    let finder = OrderItems::find()
        .inner_join(Orders)
        .filter(OrderItemCol::ProductId.is_in(products.keys().copied()))
        .filter(OrderCol::Status.ne(OrderStatus::Created))
        .filter(OrderCol::Status.ne(OrderStatus::Cancelled))
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let lines = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let orders: HashMap<Uuid, _> = Orders::find()
        .filter(OrderCol::Id.is_in(lines.iter().map(|l| l.order_id)))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|o| (o.id, o))
        .collect();

    let items = lines
        .into_iter()
        .filter_map(|line| {
            let order = orders.get(&line.order_id)?;
            let product = products.get(&line.product_id)?;
            Some(SellerTransaction {
                order_id: order.id,
                order_status: order.status,
                product_id: product.id,
                product_name: product.name.clone(),
                variant_id: line.variant_id,
                qty: line.qty,
                unit_price_cents: line.unit_price_cents,
                line_total_cents: line.unit_price_cents * i64::from(line.qty),
                currency: order.currency.clone(),
                ordered_at: order.created_at.with_timezone(&Utc),
            })
        })
        .collect();

    Ok(ApiResponse::success(
        "Transactions",
        items,
        Some(Meta::new(page, limit, total)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("  Red Linen Shirt (XL) "), "red-linen-shirt-xl");
        assert_eq!(slugify("Über--cool!!"), "ber-cool");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn currency_codes_are_normalised() {
        assert_eq!(normalize_currency(" gbp ").unwrap(), "GBP");
        assert!(normalize_currency("POUND").is_err());
        assert!(normalize_currency("G1P").is_err());
    }

    #[test]
    fn negative_prices_and_stock_are_rejected() {
        assert!(check_price(-1).is_err());
        assert!(check_price(0).is_ok());
        assert!(check_stock(-5).is_err());
    }
}

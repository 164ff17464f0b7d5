use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
    prelude::DateTimeWithTimeZone,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{
        CheckoutItem, CheckoutResponse, OrderWithItems, PayPalOrderResponse, StripeIntentResponse,
    },
    entity::{
        CartItems, Products, Variants,
        cart_items::Column as CartCol,
        order_items::ActiveModel as OrderItemActive,
        orders::{ActiveModel as OrderActive, OrderStatus, PaymentProvider},
        products::{Column as ProdCol, Model as ProductModel},
        variants::{Column as VariantCol, Model as VariantModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    payments::{IntentRequest, PaymentIntent},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Upper bound on a single line, to keep totals far from overflow.
pub const MAX_LINE_QTY: i32 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub total_cents: i64,
    pub currency: String,
}

/// Prices `items` from the catalog rows alone. Every failure here is a
/// client error and happens before any provider call or write.
pub fn price_items(
    items: &[CheckoutItem],
    products: &HashMap<Uuid, ProductModel>,
    variants: &HashMap<Uuid, VariantModel>,
) -> AppResult<PricedCart> {
    if items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut currency: Option<&str> = None;
    let mut total_cents: i64 = 0;

    for item in items {
        if item.qty <= 0 || item.qty > MAX_LINE_QTY {
            return Err(AppError::BadRequest(format!(
                "quantity must be between 1 and {MAX_LINE_QTY}"
            )));
        }

        let product = products
            .get(&item.product_id)
            .filter(|p| p.active)
            .ok_or_else(|| {
                AppError::BadRequest(format!("product {} is unknown or inactive", item.product_id))
            })?;

        if let Some(variant_id) = item.variant_id {
            let belongs = variants
                .get(&variant_id)
                .is_some_and(|v| v.product_id == product.id);
            if !belongs {
                return Err(AppError::BadRequest(format!(
                    "variant {variant_id} does not belong to product {}",
                    product.id
                )));
            }
        }

        match currency {
            None => currency = Some(&product.currency),
            Some(c) if c == product.currency => {}
            Some(_) => {
                return Err(AppError::BadRequest(
                    "all items must share one currency".into(),
                ));
            }
        }

        let line_total = product
            .price_cents
            .checked_mul(i64::from(item.qty))
            .and_then(|line| total_cents.checked_add(line))
            .ok_or_else(|| AppError::BadRequest("order total is too large".into()))?;
        total_cents = line_total;

        lines.push(PricedLine {
            product_id: product.id,
            variant_id: item.variant_id,
            qty: item.qty,
            unit_price_cents: product.price_cents,
        });
    }

    Ok(PricedCart {
        lines,
        total_cents,
        currency: currency.unwrap_or_default().to_string(),
    })
}

async fn load_catalog(
    state: &AppState,
    items: &[CheckoutItem],
) -> AppResult<(HashMap<Uuid, ProductModel>, HashMap<Uuid, VariantModel>)> {
    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let variant_ids: Vec<Uuid> = items.iter().filter_map(|i| i.variant_id).collect();

    let products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let variants = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        Variants::find()
            .filter(VariantCol::Id.is_in(variant_ids))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    Ok((products, variants))
}

pub struct PlacedOrder {
    pub order: OrderWithItems,
    pub intent: PaymentIntent,
}

/// Prices the items, asks the provider for an intent, then writes the order
/// and its lines in one transaction. Nothing is written unless the provider
/// accepted, so every stored order has a `provider_ref`.
#[tracing::instrument(skip(state, user, items), fields(user_id = %user.user_id, provider = provider.as_str()))]
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    items: &[CheckoutItem],
    provider: PaymentProvider,
    clear_cart: bool,
) -> AppResult<PlacedOrder> {
    let (products, variants) = load_catalog(state, items).await?;
    let priced = price_items(items, &products, &variants)?;
    let gateway = state.payments.get(provider)?;

    let order_id = Uuid::new_v4();
    let intent = gateway
        .create_intent(&IntentRequest {
            order_id,
            amount_cents: priced.total_cents,
            currency: &priced.currency,
            customer_email: &user.email,
        })
        .await?;

    let now: DateTimeWithTimeZone = Utc::now().into();
    let (status, paid_at) = if intent.settled {
        (OrderStatus::Paid, Some(now))
    } else {
        (OrderStatus::Created, None)
    };

    let txn = state.orm.begin().await?;
    let written: AppResult<OrderWithItems> = async {
        let order = OrderActive {
            id: Set(order_id),
            user_id: Set(user.user_id),
            total_cents: Set(priced.total_cents),
            currency: Set(priced.currency.clone()),
            status: Set(status),
            payment_provider: Set(provider),
            provider_ref: Set(intent.provider_ref.clone()),
            paid_at: Set(paid_at),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut order_items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            let item = OrderItemActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                qty: Set(line.qty),
                unit_price_cents: Set(line.unit_price_cents),
            }
            .insert(&txn)
            .await?;
            order_items.push(OrderItem::from(item));
        }

        if clear_cart {
            CartItems::delete_many()
                .filter(CartCol::UserId.eq(user.user_id))
                .exec(&txn)
                .await?;
        }

        Ok(OrderWithItems {
            order: Order::from(order),
            items: order_items,
        })
    }
    .await;

    let order = match written {
        Ok(order) => {
            txn.commit().await?;
            order
        }
        Err(err) => {
            // The provider already holds an intent for this reference.
            tracing::error!(
                order_id = %order_id,
                provider_ref = %intent.provider_ref,
                "order write failed after provider accepted the intent"
            );
            txn.rollback().await?;
            return Err(err);
        }
    };

    tracing::info!(
        order_id = %order.order.id,
        total_cents = order.order.total_cents,
        status = ?order.order.status,
        "order placed"
    );

    audit::record(
        state,
        Some(user.user_id),
        "order_created",
        "order",
        order.order.id,
        Some(serde_json::json!({
            "provider": provider.as_str(),
            "provider_ref": intent.provider_ref,
            "total_cents": order.order.total_cents,
        })),
    )
    .await;

    Ok(PlacedOrder { order, intent })
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    items: Vec<CheckoutItem>,
    provider: Option<PaymentProvider>,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let placed = place_order(
        state,
        user,
        &items,
        provider.unwrap_or(PaymentProvider::Stub),
        false,
    )
    .await?;
    Ok(ApiResponse::success(
        "Order created",
        checkout_response(placed),
        Some(Meta::empty()),
    ))
}

/// Checks out the caller's stored cart and empties it with the same commit.
pub async fn checkout_cart(
    state: &AppState,
    user: &AuthUser,
    provider: Option<PaymentProvider>,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let items: Vec<CheckoutItem> = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|line| CheckoutItem {
            product_id: line.product_id,
            variant_id: line.variant_id,
            qty: line.quantity,
        })
        .collect();

    let placed = place_order(
        state,
        user,
        &items,
        provider.unwrap_or(PaymentProvider::Stub),
        true,
    )
    .await?;
    Ok(ApiResponse::success(
        "Order created",
        checkout_response(placed),
        Some(Meta::empty()),
    ))
}

pub async fn create_stripe_intent(
    state: &AppState,
    user: &AuthUser,
    items: Vec<CheckoutItem>,
) -> AppResult<ApiResponse<StripeIntentResponse>> {
    let placed = place_order(state, user, &items, PaymentProvider::Stripe, false).await?;
    Ok(ApiResponse::success(
        "Payment intent created",
        StripeIntentResponse {
            client_secret: placed.intent.client_secret,
            order_id: placed.order.order.id,
        },
        Some(Meta::empty()),
    ))
}

pub async fn create_paypal_order(
    state: &AppState,
    user: &AuthUser,
    items: Vec<CheckoutItem>,
) -> AppResult<ApiResponse<PayPalOrderResponse>> {
    let placed = place_order(state, user, &items, PaymentProvider::PayPal, false).await?;
    Ok(ApiResponse::success(
        "PayPal order created",
        PayPalOrderResponse {
            paypal_order_id: placed.intent.provider_ref,
            approve_url: placed.intent.approve_url,
            order_id: placed.order.order.id,
        },
        Some(Meta::empty()),
    ))
}

fn checkout_response(placed: PlacedOrder) -> CheckoutResponse {
    CheckoutResponse {
        order: placed.order,
        client_secret: placed.intent.client_secret,
        approve_url: placed.intent.approve_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn product(price_cents: i64, currency: &str, active: bool) -> ProductModel {
        let id = Uuid::new_v4();
        ProductModel {
            id,
            owner_id: None,
            sku: format!("SKU-{}", id.simple()),
            name: "Tee".into(),
            brand: "Acme".into(),
            category: "tops".into(),
            description_md: String::new(),
            price_cents,
            currency: currency.into(),
            active,
            seo_slug: format!("tee-{}", id.simple()),
            hero_image_url: None,
            created_at: Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()),
        }
    }

    fn item(product_id: Uuid, qty: i32) -> CheckoutItem {
        CheckoutItem {
            product_id,
            variant_id: None,
            qty,
        }
    }

    fn catalog(products: &[ProductModel]) -> HashMap<Uuid, ProductModel> {
        products.iter().map(|p| (p.id, p.clone())).collect()
    }

    #[test]
    fn totals_use_server_side_prices() {
        let p = product(1500, "GBP", true);
        let priced = price_items(&[item(p.id, 2)], &catalog(&[p.clone()]), &HashMap::new()).unwrap();
        assert_eq!(priced.total_cents, 3000);
        assert_eq!(priced.currency, "GBP");
        assert_eq!(priced.lines[0].unit_price_cents, 1500);
    }

    #[test]
    fn total_is_sum_of_lines() {
        let a = product(1999, "GBP", true);
        let b = product(250, "GBP", true);
        let items = [item(a.id, 3), item(b.id, 4), item(a.id, 1)];
        let priced = price_items(&items, &catalog(&[a, b]), &HashMap::new()).unwrap();
        let sum: i64 = priced
            .lines
            .iter()
            .map(|l| l.unit_price_cents * i64::from(l.qty))
            .sum();
        assert_eq!(priced.total_cents, sum);
        assert_eq!(priced.total_cents, 1999 * 4 + 250 * 4);
    }

    #[test]
    fn empty_and_non_positive_quantities_are_rejected() {
        let p = product(100, "GBP", true);
        let cat = catalog(&[p.clone()]);
        assert!(price_items(&[], &cat, &HashMap::new()).is_err());
        assert!(price_items(&[item(p.id, 0)], &cat, &HashMap::new()).is_err());
        assert!(price_items(&[item(p.id, -1)], &cat, &HashMap::new()).is_err());
        assert!(price_items(&[item(p.id, MAX_LINE_QTY + 1)], &cat, &HashMap::new()).is_err());
    }

    #[test]
    fn unknown_or_inactive_products_are_rejected() {
        let inactive = product(100, "GBP", false);
        let cat = catalog(&[inactive.clone()]);
        let err = price_items(&[item(inactive.id, 1)], &cat, &HashMap::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(price_items(&[item(Uuid::new_v4(), 1)], &cat, &HashMap::new()).is_err());
    }

    #[test]
    fn mixed_currencies_are_rejected() {
        let a = product(100, "GBP", true);
        let b = product(100, "EUR", true);
        let items = [item(a.id, 1), item(b.id, 1)];
        assert!(price_items(&items, &catalog(&[a, b]), &HashMap::new()).is_err());
    }

    #[test]
    fn variants_must_belong_to_their_product() {
        let a = product(100, "GBP", true);
        let b = product(100, "GBP", true);
        let variant = VariantModel {
            id: Uuid::new_v4(),
            product_id: b.id,
            size: Some("M".into()),
            colour: None,
            stock: 3,
            gtin: None,
        };
        let variants: HashMap<_, _> = [(variant.id, variant.clone())].into();
        let cat = catalog(&[a.clone(), b.clone()]);

        let wrong = CheckoutItem {
            product_id: a.id,
            variant_id: Some(variant.id),
            qty: 1,
        };
        assert!(price_items(&[wrong], &cat, &variants).is_err());

        let right = CheckoutItem {
            product_id: b.id,
            variant_id: Some(variant.id),
            qty: 1,
        };
        assert!(price_items(&[right], &cat, &variants).is_ok());
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let p = product(i64::MAX / 2, "GBP", true);
        assert!(price_items(&[item(p.id, 3)], &catalog(&[p]), &HashMap::new()).is_err());
    }
}

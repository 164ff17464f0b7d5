//! Public records returned by the API. Entity models stay internal; these
//! drop secrets (password hashes) and normalise timestamps to UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    audit_logs, cart_items, events_interaction, events_view, order_items,
    orders::{self, OrderStatus, PaymentProvider},
    product_images, products, review_flags, reviews,
    seller_applications::{self, ApplicationStatus},
    users::{self, Role},
    variants,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            display_name: model.display_name,
            role: model.role,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SellerApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: ApplicationStatus,
    pub note: Option<String>,
    pub decided_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl From<seller_applications::Model> for SellerApplication {
    fn from(model: seller_applications::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            status: model.status,
            note: model.note,
            decided_by: model.decided_by,
            created_at: model.created_at.with_timezone(&Utc),
            decided_at: model.decided_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description_md: String,
    pub price_cents: i64,
    pub currency: String,
    pub active: bool,
    pub seo_slug: String,
    pub hero_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            sku: model.sku,
            name: model.name,
            brand: model.brand,
            category: model.category,
            description_md: model.description_md,
            price_cents: model.price_cents,
            currency: model.currency,
            active: model.active,
            seo_slug: model.seo_slug,
            hero_image_url: model.hero_image_url,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductImage {
    pub id: Uuid,
    pub url: String,
    pub sort_index: i32,
}

impl From<product_images::Model> for ProductImage {
    fn from(model: product_images::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            sort_index: model.sort_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Variant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: Option<String>,
    pub colour: Option<String>,
    pub stock: i32,
    pub gtin: Option<String>,
}

impl From<variants::Model> for Variant {
    fn from(model: variants::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            size: model.size,
            colour: model.colour,
            stock: model.stock,
            gtin: model.gtin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl From<cart_items::Model> for CartItem {
    fn from(model: cart_items::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_provider: PaymentProvider,
    pub provider_ref: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total_cents: model.total_cents,
            currency: model.currency,
            status: model.status,
            payment_provider: model.payment_provider,
            provider_ref: model.provider_ref,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty: i32,
    pub unit_price_cents: i64,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            qty: model.qty,
            unit_price_cents: model.unit_price_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub body_md: String,
    pub body_html: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<reviews::Model> for Review {
    fn from(model: reviews::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            user_id: model.user_id,
            rating: model.rating,
            body_md: model.body_md,
            body_html: model.body_html_sanitised,
            images: serde_json::from_value(model.images).unwrap_or_default(),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewFlag {
    pub id: Uuid,
    pub review_id: Uuid,
    pub flagged_by: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<review_flags::Model> for ReviewFlag {
    fn from(model: review_flags::Model) -> Self {
        Self {
            id: model.id,
            review_id: model.review_id,
            flagged_by: model.flagged_by,
            reason: model.reason,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ViewEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: String,
    pub path: String,
    pub product_id: Option<Uuid>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<events_view::Model> for ViewEvent {
    fn from(model: events_view::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            session_id: model.session_id,
            path: model.path,
            product_id: model.product_id,
            referrer: model.referrer,
            user_agent: model.user_agent,
            occurred_at: model.occurred_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InteractionEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: String,
    pub event_type: String,
    pub event_data: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

impl From<events_interaction::Model> for InteractionEvent {
    fn from(model: events_interaction::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            session_id: model.session_id,
            event_type: model.event_type,
            event_data: model.event_data,
            occurred_at: model.occurred_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub metadata: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

impl From<audit_logs::Model> for AuditLog {
    fn from(model: audit_logs::Model) -> Self {
        Self {
            id: model.id,
            actor_id: model.actor_id,
            action: model.action,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            metadata: model.metadata,
            occurred_at: model.occurred_at.with_timezone(&Utc),
        }
    }
}

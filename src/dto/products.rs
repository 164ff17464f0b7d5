use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::orders::OrderStatus,
    models::{Product, ProductImage, Variant},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewVariant {
    pub size: Option<String>,
    pub colour: Option<String>,
    #[serde(default)]
    pub stock: i32,
    pub gtin: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewImage {
    pub url: String,
    pub sort_index: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    #[serde(default)]
    pub description_md: String,
    pub price_cents: i64,
    pub currency: Option<String>,
    pub active: Option<bool>,
    pub seo_slug: Option<String>,
    pub hero_image_url: Option<String>,
    #[serde(default)]
    pub variants: Vec<NewVariant>,
    #[serde(default)]
    pub images: Vec<NewImage>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description_md: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub active: Option<bool>,
    pub seo_slug: Option<String>,
    pub hero_image_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewSummary {
    pub count: u64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub description_html: String,
    pub variants: Vec<Variant>,
    pub images: Vec<ProductImage>,
    pub reviews: ReviewSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductRemoval {
    pub id: Uuid,
    /// `true` when the product had order lines and was only deactivated.
    pub deactivated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SellerTransaction {
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_id: Option<Uuid>,
    pub qty: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub currency: String,
    pub ordered_at: DateTime<Utc>,
}

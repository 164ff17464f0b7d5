use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::orders::{OrderStatus, PaymentProvider},
    models::{Order, OrderItem},
};

/// One requested line. Any client-side price is ignored.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[serde(alias = "quantity")]
    pub qty: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    /// Defaults to the stub provider.
    pub provider: Option<PaymentProvider>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartCheckoutRequest {
    pub provider: Option<PaymentProvider>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderCheckoutRequest {
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderWithItems,
    pub client_secret: Option<String>,
    pub approve_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StripeIntentResponse {
    pub client_secret: Option<String>,
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PayPalOrderResponse {
    pub paypal_order_id: String,
    pub approve_url: Option<String>,
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct OrderList {
    #[schema(value_type = Vec<Order>)]
    pub items: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Body returned to payment providers.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub status: String,
}

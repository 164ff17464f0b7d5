use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};

use crate::{
    dto::orders::{
        CheckoutRequest, CheckoutResponse, PayPalOrderResponse, ProviderCheckoutRequest,
        StripeIntentResponse, WebhookAck,
    },
    entity::orders::PaymentProvider,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::extract::AppJson,
    services::{
        checkout_service,
        webhook_service::{self, Reconciliation},
    },
    state::AppState,
};

pub fn checkout_router() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

pub fn payments_router() -> Router<AppState> {
    Router::new()
        .route("/stripe/create-intent", post(create_stripe_intent))
        .route("/paypal/create-order", post(create_paypal_order))
}

pub fn webhooks_router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(stripe_webhook))
        .route("/paypal", post(paypal_webhook))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order priced server-side and created", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty, invalid or unavailable items"),
        (status = 500, description = "Payment provider error")
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CheckoutResponse>>)> {
    let resp = checkout_service::checkout(&state, &user, payload.items, payload.provider).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/payments/stripe/create-intent",
    request_body = ProviderCheckoutRequest,
    responses(
        (status = 201, description = "Order created with a Stripe payment intent", body = ApiResponse<StripeIntentResponse>),
        (status = 400, description = "Invalid items or Stripe not configured"),
        (status = 500, description = "Stripe error")
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_stripe_intent(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<ProviderCheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<StripeIntentResponse>>)> {
    let resp = checkout_service::create_stripe_intent(&state, &user, payload.items).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/payments/paypal/create-order",
    request_body = ProviderCheckoutRequest,
    responses(
        (status = 201, description = "Order created with a PayPal order to approve", body = ApiResponse<PayPalOrderResponse>),
        (status = 400, description = "Invalid items or PayPal not configured"),
        (status = 500, description = "PayPal error")
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_paypal_order(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<ProviderCheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<PayPalOrderResponse>>)> {
    let resp = checkout_service::create_paypal_order(&state, &user, payload.items).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// Unknown orders are acknowledged with 202 so the provider stops retrying.
fn acknowledge(outcome: Reconciliation) -> (StatusCode, Json<WebhookAck>) {
    let status = match outcome {
        Reconciliation::UnknownOrder => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    (status, Json(outcome.ack()))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/stripe",
    request_body(content = String, description = "Raw Stripe event, signed with Stripe-Signature"),
    responses(
        (status = 200, description = "Event applied or already processed", body = WebhookAck),
        (status = 202, description = "No order for this payment", body = WebhookAck),
        (status = 400, description = "Bad signature or payload")
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<WebhookAck>)> {
    let outcome =
        webhook_service::handle_webhook(&state, PaymentProvider::Stripe, &headers, &body).await?;
    Ok(acknowledge(outcome))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/paypal",
    request_body(content = String, description = "Raw PayPal event with transmission headers"),
    responses(
        (status = 200, description = "Event applied or already processed", body = WebhookAck),
        (status = 202, description = "No order for this payment", body = WebhookAck),
        (status = 400, description = "Bad signature or payload")
    ),
    tag = "Webhooks"
)]
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<WebhookAck>)> {
    let outcome =
        webhook_service::handle_webhook(&state, PaymentProvider::PayPal, &headers, &body).await?;
    Ok(acknowledge(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_orders_are_accepted_not_ok() {
        let (status, Json(ack)) = acknowledge(Reconciliation::UnknownOrder);
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(ack.received);
        assert_eq!(ack.status, "unknown_order");

        let (status, _) = acknowledge(Reconciliation::AlreadyProcessed);
        assert_eq!(status, StatusCode::OK);
    }
}

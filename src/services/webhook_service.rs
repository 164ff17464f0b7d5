use axum::http::HeaderMap;
use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};

use crate::{
    audit,
    dto::orders::WebhookAck,
    entity::{
        Orders,
        orders::{Column as OrderCol, OrderStatus, PaymentProvider},
    },
    error::AppResult,
    payments::WebhookEvent,
    state::AppState,
};

/// Outcome of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// This delivery moved the order from `created` to `paid`.
    Paid,
    /// The order was found but was not `created` any more.
    AlreadyProcessed,
    UnknownOrder,
    Ignored,
}

impl Reconciliation {
    pub fn as_str(self) -> &'static str {
        match self {
            Reconciliation::Paid => "paid",
            Reconciliation::AlreadyProcessed => "already_processed",
            Reconciliation::UnknownOrder => "unknown_order",
            Reconciliation::Ignored => "ignored",
        }
    }

    pub fn ack(self) -> WebhookAck {
        WebhookAck {
            received: true,
            status: self.as_str().to_string(),
        }
    }
}

/// Verifies the delivery, then applies it. The signature is checked on the
/// raw body before anything in it is read.
#[tracing::instrument(skip(state, headers, body), fields(provider = provider.as_str()))]
pub async fn handle_webhook(
    state: &AppState,
    provider: PaymentProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<Reconciliation> {
    let gateway = state.payments.get(provider)?;
    gateway.verify_webhook(body, headers).await?;

    match gateway.parse_event(body)? {
        WebhookEvent::PaymentSucceeded { provider_ref } => {
            mark_paid(state, provider, &provider_ref).await
        }
        WebhookEvent::Ignored { event_type } => {
            tracing::debug!(event_type = %event_type, "webhook event ignored");
            Ok(Reconciliation::Ignored)
        }
    }
}

/// `created -> paid` as one conditional UPDATE, so repeated or concurrent
/// deliveries transition the order at most once.
pub async fn mark_paid(
    state: &AppState,
    provider: PaymentProvider,
    provider_ref: &str,
) -> AppResult<Reconciliation> {
    let Some(order) = Orders::find()
        .filter(OrderCol::PaymentProvider.eq(provider))
        .filter(OrderCol::ProviderRef.eq(provider_ref))
        .one(&state.orm)
        .await?
    else {
        tracing::warn!(provider_ref = %provider_ref, "payment webhook for unknown order");
        return Ok(Reconciliation::UnknownOrder);
    };

    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Paid))
        .col_expr(OrderCol::PaidAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order.id))
        .filter(OrderCol::Status.eq(OrderStatus::Created))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        tracing::info!(order_id = %order.id, status = ?order.status, "duplicate payment webhook");
        return Ok(Reconciliation::AlreadyProcessed);
    }

    tracing::info!(order_id = %order.id, "order marked paid");
    audit::record(
        state,
        None,
        "order_paid",
        "order",
        order.id,
        Some(serde_json::json!({
            "provider": provider.as_str(),
            "provider_ref": provider_ref,
        })),
    )
    .await;

    Ok(Reconciliation::Paid)
}

#[cfg(test)]
mod tests {
    use super::Reconciliation;

    #[test]
    fn ack_always_reports_receipt() {
        let ack = Reconciliation::UnknownOrder.ack();
        assert!(ack.received);
        assert_eq!(ack.status, "unknown_order");
        assert_eq!(Reconciliation::Paid.ack().status, "paid");
    }
}

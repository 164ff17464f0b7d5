use async_trait::async_trait;
use axum::http::HeaderMap;

use super::{IntentRequest, PaymentError, PaymentGateway, PaymentIntent, WebhookEvent};
use crate::entity::orders::PaymentProvider;

/// Settles every charge immediately. Used for demo checkouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stub
    }

    async fn create_intent(&self, request: &IntentRequest<'_>) -> Result<PaymentIntent, PaymentError> {
        tracing::info!(
            order_id = %request.order_id,
            amount_cents = request.amount_cents,
            currency = %request.currency,
            "stub payment settled"
        );
        Ok(PaymentIntent {
            provider_ref: format!("stub-{}", request.order_id.simple()),
            client_secret: None,
            approve_url: None,
            settled: true,
        })
    }

    async fn verify_webhook(&self, _payload: &[u8], _headers: &HeaderMap) -> Result<(), PaymentError> {
        Err(PaymentError::InvalidSignature(
            "stub payments do not send webhooks".into(),
        ))
    }

    fn parse_event(&self, _payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        Ok(WebhookEvent::Ignored {
            event_type: "stub".into(),
        })
    }
}

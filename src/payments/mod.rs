//! Payment provider adapters.
//!
//! Each provider implements [`PaymentGateway`]: create a payment intent/order
//! for a checkout, verify an inbound webhook, and interpret its payload. The
//! [`PaymentRegistry`] in application state hands out the configured gateways.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use crate::{config::AppConfig, entity::orders::PaymentProvider, error::AppError};

pub mod paypal;
pub mod stripe;
pub mod stub;

pub use paypal::PayPalGateway;
pub use stripe::StripeGateway;
pub use stub::StubGateway;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("payment provider {0} is not configured")]
    NotConfigured(&'static str),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature(reason) => {
                tracing::warn!(reason = %reason, "webhook signature rejected");
                AppError::InvalidSignature
            }
            PaymentError::InvalidPayload(reason) => {
                AppError::BadRequest(format!("invalid webhook payload: {reason}"))
            }
            PaymentError::NotConfigured(name) => AppError::invalid(
                "provider_unavailable",
                format!("payment provider {name} is not available"),
            ),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

/// What the checkout asks a provider to charge.
#[derive(Debug, Clone)]
pub struct IntentRequest<'a> {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub customer_email: &'a str,
}

/// A provider's answer to [`IntentRequest`].
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Provider-side identifier, stored as `orders.provider_ref`.
    pub provider_ref: String,
    pub client_secret: Option<String>,
    pub approve_url: Option<String>,
    /// True when the provider charged synchronously and no webhook will follow.
    pub settled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded { provider_ref: String },
    Ignored { event_type: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn create_intent(&self, request: &IntentRequest<'_>) -> Result<PaymentIntent, PaymentError>;

    /// Must succeed before [`PaymentGateway::parse_event`] is trusted.
    async fn verify_webhook(&self, payload: &[u8], headers: &HeaderMap) -> Result<(), PaymentError>;

    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError>;
}

#[derive(Clone, Default)]
pub struct PaymentRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl PaymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    /// Registers the stub gateway plus every provider whose credentials are present.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.payment_timeout_secs))
            .build()?;

        let mut registry = Self::new().with(Arc::new(StubGateway));
        if let Some(stripe) = &config.stripe {
            registry = registry.with(Arc::new(StripeGateway::new(client.clone(), stripe)));
        } else {
            tracing::warn!("Stripe is not configured, stripe payments are disabled");
        }
        if let Some(paypal) = &config.paypal {
            registry = registry.with(Arc::new(PayPalGateway::new(client, paypal)));
        } else {
            tracing::warn!("PayPal is not configured, paypal payments are disabled");
        }
        Ok(registry)
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or(PaymentError::NotConfigured(provider.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_reported_as_unavailable() {
        let registry = PaymentRegistry::new().with(Arc::new(StubGateway));
        assert!(registry.get(PaymentProvider::Stub).is_ok());

        let err: AppError = registry.get(PaymentProvider::Stripe).err().unwrap().into();
        assert_eq!(err.code(), "provider_unavailable");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn transport_failures_become_generic_upstream_errors() {
        let err: AppError = PaymentError::Api {
            status: 402,
            message: "card_declined".into(),
        }
        .into();
        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(err.to_string(), "Payment provider error");
    }
}

//! Stripe PaymentIntents and webhook signature verification.
//!
//! <https://docs.stripe.com/webhooks#verify-manually>

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{IntentRequest, PaymentError, PaymentGateway, PaymentIntent, WebhookEvent};
use crate::{config::StripeConfig, entity::orders::PaymentProvider};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntentResponse {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeEventObject,
}

#[derive(Debug, Deserialize)]
struct StripeEventObject {
    id: String,
}

impl StripeGateway {
    pub fn new(client: reqwest::Client, config: &StripeConfig) -> Self {
        Self {
            client,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_intent(&self, request: &IntentRequest<'_>) -> Result<PaymentIntent, PaymentError> {
        let order_id = request.order_id.to_string();
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("metadata[order_id]", order_id.clone()),
            ("receipt_email", request.customer_email.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", order_id)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let intent: StripeIntentResponse = response.json().await?;
        tracing::info!(intent = %intent.id, "stripe payment intent created");

        Ok(PaymentIntent {
            provider_ref: intent.id,
            client_secret: intent.client_secret,
            approve_url: None,
            settled: false,
        })
    }

    async fn verify_webhook(&self, payload: &[u8], headers: &HeaderMap) -> Result<(), PaymentError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature header".into()))?;

        verify_signature(
            payload,
            header,
            &self.webhook_secret,
            chrono::Utc::now().timestamp(),
        )
    }

    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

        Ok(match event.event_type.as_str() {
            "payment_intent.succeeded" => WebhookEvent::PaymentSucceeded {
                provider_ref: event.data.object.id,
            },
            _ => WebhookEvent::Ignored {
                event_type: event.event_type,
            },
        })
    }
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against `HMAC-SHA256(secret, "<t>.<payload>")`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".into()));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".into()))?;
    let within_tolerance = now
        .checked_sub(ts)
        .is_some_and(|skew| skew.unsigned_abs() <= SIGNATURE_TOLERANCE_SECS.unsigned_abs());
    if !within_tolerance {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".into(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|expected| mac.clone().verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature("signature mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(payload, NOW);
        assert!(verify_signature(payload, &header, SECRET, NOW + 10).is_ok());
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let header = sign(b"original", NOW);
        let err = verify_signature(b"tampered", &header, SECRET, NOW).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_stale_timestamps() {
        let payload = b"{}";
        let header = sign(payload, NOW - SIGNATURE_TOLERANCE_SECS - 1);
        assert!(verify_signature(payload, &header, SECRET, NOW).is_err());
    }

    #[test]
    fn rejects_extreme_timestamps_without_overflow() {
        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            let err = verify_signature(b"{}", header, SECRET, NOW).unwrap_err();
            assert!(matches!(err, PaymentError::InvalidSignature(_)));
        }
        let err = verify_signature(b"{}", "t=-1,v1=00", SECRET, i64::MAX).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn accepts_when_any_v1_signature_matches() {
        let payload = b"{}";
        let good = sign(payload, NOW);
        let header = format!("t={NOW},v1=deadbeef,{}", good.split_once(',').unwrap().1);
        assert!(verify_signature(payload, &header, SECRET, NOW).is_ok());
    }

    #[test]
    fn rejects_headers_without_signatures() {
        assert!(verify_signature(b"{}", &format!("t={NOW}"), SECRET, NOW).is_err());
        assert!(verify_signature(b"{}", "v1=abcd", SECRET, NOW).is_err());
        assert!(verify_signature(b"{}", "", SECRET, NOW).is_err());
    }

    #[test]
    fn parses_succeeded_events_and_ignores_the_rest() {
        let gateway = StripeGateway::new(
            reqwest::Client::new(),
            &StripeConfig {
                secret_key: "sk_test".into(),
                webhook_secret: SECRET.into(),
                api_base: "https://api.stripe.com".into(),
            },
        );

        let succeeded = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;
        assert_eq!(
            gateway.parse_event(succeeded).unwrap(),
            WebhookEvent::PaymentSucceeded {
                provider_ref: "pi_123".into()
            }
        );

        let failed = br#"{"type":"payment_intent.payment_failed","data":{"object":{"id":"pi_123"}}}"#;
        assert!(matches!(
            gateway.parse_event(failed).unwrap(),
            WebhookEvent::Ignored { .. }
        ));

        assert!(gateway.parse_event(b"not json").is_err());
    }
}

//! PayPal Orders v2 and webhook verification via the
//! `verify-webhook-signature` endpoint.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{IntentRequest, PaymentError, PaymentGateway, PaymentIntent, WebhookEvent};
use crate::{config::PayPalConfig, entity::orders::PaymentProvider};

const TRANSMISSION_HEADERS: [&str; 5] = [
    "paypal-transmission-id",
    "paypal-transmission-time",
    "paypal-transmission-sig",
    "paypal-cert-url",
    "paypal-auth-algo",
];

#[derive(Clone)]
pub struct PayPalGateway {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    webhook_id: String,
    api_base: String,
}

impl std::fmt::Debug for PayPalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalGateway")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    intent: &'static str,
    purchase_units: [PurchaseUnit<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PurchaseUnit<'a> {
    reference_id: String,
    amount: Amount<'a>,
}

#[derive(Debug, Serialize)]
struct Amount<'a> {
    currency_code: &'a str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Serialize)]
struct VerifyBody<'a> {
    transmission_id: &'a str,
    transmission_time: &'a str,
    transmission_sig: &'a str,
    cert_url: &'a str,
    auth_algo: &'a str,
    webhook_id: &'a str,
    webhook_event: Value,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verification_status: String,
}

#[derive(Debug, Deserialize)]
struct PayPalEvent {
    event_type: String,
    resource: PayPalResource,
}

#[derive(Debug, Deserialize)]
struct PayPalResource {
    id: String,
    supplementary_data: Option<SupplementaryData>,
}

#[derive(Debug, Deserialize)]
struct SupplementaryData {
    related_ids: Option<RelatedIds>,
}

#[derive(Debug, Deserialize)]
struct RelatedIds {
    order_id: Option<String>,
}

impl PayPalGateway {
    pub fn new(client: reqwest::Client, config: &PayPalConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            webhook_id: config.webhook_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PaymentError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::PayPal
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_intent(&self, request: &IntentRequest<'_>) -> Result<PaymentIntent, PaymentError> {
        let token = self.access_token().await?;
        let body = CreateOrderBody {
            intent: "CAPTURE",
            purchase_units: [PurchaseUnit {
                reference_id: request.order_id.to_string(),
                amount: Amount {
                    currency_code: request.currency,
                    value: format_amount(request.amount_cents),
                },
            }],
        };

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(token)
            .header("PayPal-Request-Id", request.order_id.to_string())
            .json(&body)
            .send()
            .await?;

        let created: CreateOrderResponse = ensure_success(response).await?.json().await?;
        tracing::info!(paypal_order = %created.id, "paypal order created");

        let approve_url = created
            .links
            .into_iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href);

        Ok(PaymentIntent {
            provider_ref: created.id,
            client_secret: None,
            approve_url,
            settled: false,
        })
    }

    async fn verify_webhook(&self, payload: &[u8], headers: &HeaderMap) -> Result<(), PaymentError> {
        let mut values = Vec::with_capacity(TRANSMISSION_HEADERS.len());
        for name in TRANSMISSION_HEADERS {
            let value = headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PaymentError::InvalidSignature(format!("missing {name} header")))?;
            values.push(value);
        }

        // The verification endpoint needs the event echoed back as JSON. The
        // value is only forwarded here, never acted on.
        let webhook_event: Value = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

        let body = VerifyBody {
            transmission_id: values[0],
            transmission_time: values[1],
            transmission_sig: values[2],
            cert_url: values[3],
            auth_algo: values[4],
            webhook_id: &self.webhook_id,
            webhook_event,
        };

        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.api_base
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let verdict: VerifyResponse = ensure_success(response).await?.json().await?;
        if verdict.verification_status == "SUCCESS" {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature(format!(
                "verification status {}",
                verdict.verification_status
            )))
        }
    }

    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        parse_event(payload)
    }
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
    let event: PayPalEvent =
        serde_json::from_slice(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

    let provider_ref = match event.event_type.as_str() {
        "CHECKOUT.ORDER.COMPLETED" => Some(event.resource.id),
        // Capture events carry the capture id; the order id sits in related_ids.
        "PAYMENT.CAPTURE.COMPLETED" => event
            .resource
            .supplementary_data
            .and_then(|data| data.related_ids)
            .and_then(|ids| ids.order_id),
        _ => None,
    };

    Ok(match provider_ref {
        Some(provider_ref) => WebhookEvent::PaymentSucceeded { provider_ref },
        None => WebhookEvent::Ignored {
            event_type: event.event_type,
        },
    })
}

/// Minor units to PayPal's decimal string, e.g. `1999` -> `"19.99"`.
pub fn format_amount(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_amount(1999), "19.99");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(300000), "3000.00");
    }

    #[test]
    fn order_completed_uses_resource_id() {
        let payload = br#"{"event_type":"CHECKOUT.ORDER.COMPLETED","resource":{"id":"5O190127TN364715T"}}"#;
        assert_eq!(
            parse_event(payload).unwrap(),
            WebhookEvent::PaymentSucceeded {
                provider_ref: "5O190127TN364715T".into()
            }
        );
    }

    #[test]
    fn capture_completed_uses_related_order_id() {
        let payload = br#"{
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "CAPTURE-1",
                "supplementary_data": { "related_ids": { "order_id": "ORDER-9" } }
            }
        }"#;
        assert_eq!(
            parse_event(payload).unwrap(),
            WebhookEvent::PaymentSucceeded {
                provider_ref: "ORDER-9".into()
            }
        );
    }

    #[test]
    fn approvals_are_not_payments() {
        let payload = br#"{"event_type":"CHECKOUT.ORDER.APPROVED","resource":{"id":"X"}}"#;
        assert!(matches!(
            parse_event(payload).unwrap(),
            WebhookEvent::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn missing_transmission_headers_fail_before_any_call() {
        let gateway = PayPalGateway::new(
            reqwest::Client::new(),
            &PayPalConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                webhook_id: "WH-1".into(),
                api_base: "http://127.0.0.1:9".into(),
            },
        );
        let err = gateway
            .verify_webhook(b"{}", &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }
}

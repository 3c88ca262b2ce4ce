//! Stripe Checkout Sessions.
//!
//! Webhooks carry `Stripe-Signature: t=<ts>,v1=<hex>`; the signature is
//! HMAC-SHA256 over `"{t}.{body}"` keyed with the endpoint secret.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::retry::{send_with_retry, RetryPolicy};
use super::{
    parse_json, signature, ApprovedCharge, ChargeRequest, CreatedCharge, GatewayError,
    PaymentGateway, WebhookRequest,
};
use crate::entities::payment::PaymentProvider;

pub const SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
    tolerance_secs: u64,
    retry: RetryPolicy,
}

struct SignatureHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<&'a str>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader<'_>, GatewayError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp in header".into()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "missing v1 signature in header".into(),
        ));
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

impl StripeGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        tolerance_secs: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            tolerance_secs,
            retry,
        }
    }

    fn verify(&self, request: &WebhookRequest) -> Result<(), GatewayError> {
        let header = request
            .header("stripe-signature")
            .ok_or_else(|| GatewayError::InvalidSignature("missing Stripe-Signature".into()))?;
        let parsed = parse_signature_header(header)?;
        signature::check_timestamp(
            parsed.timestamp,
            chrono::Utc::now().timestamp(),
            self.tolerance_secs,
        )?;

        let mut signed = format!("{}.", parsed.timestamp).into_bytes();
        signed.extend_from_slice(&request.body);

        for candidate in parsed.signatures {
            let Ok(sig) = hex::decode(candidate) else {
                continue;
            };
            if signature::verify(self.webhook_secret.as_bytes(), &signed, &sig)? {
                return Ok(());
            }
        }
        Err(GatewayError::InvalidSignature("signature mismatch".into()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        let order_id = request.order_id.to_string();
        let form = vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", order_id.clone()),
            ("metadata[order_id]", order_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_in_cents()?.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Order {}", order_id),
            ),
        ];
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let idempotency_key = Uuid::new_v4().to_string();

        let response = send_with_retry(&self.retry, self.provider(), || {
            self.client
                .post(&url)
                .bearer_auth(&self.secret_key)
                .header("Idempotency-Key", &idempotency_key)
                .form(&form)
                .send()
        })
        .await?;

        let meta: Value = response.json().await?;
        let session_id = meta
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MalformedPayload("session without id".into()))?
            .to_string();
        let redirect_url = meta
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MalformedPayload("session without url".into()))?
            .to_string();
        debug!(session_id = %session_id, "Stripe checkout session created");

        Ok(CreatedCharge {
            external_charge_id: session_id,
            redirect_url,
            provider_meta: meta,
        })
    }

    async fn approve_charge(
        &self,
        request: &WebhookRequest,
    ) -> Result<ApprovedCharge, GatewayError> {
        self.verify(request)?;
        let event = parse_json(&request.body)?;

        let completed = event.get("type").and_then(Value::as_str) == Some(SESSION_COMPLETED);
        let paid = event
            .pointer("/data/object/payment_status")
            .and_then(Value::as_str)
            == Some("paid");
        if !completed || !paid {
            return Ok(ApprovedCharge::ignored());
        }

        let session_id = event
            .pointer("/data/object/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ApprovedCharge {
            charge_id: session_id,
            meta: Some(event),
        })
    }
}

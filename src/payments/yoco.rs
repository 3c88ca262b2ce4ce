//! Yoco hosted checkout.
//!
//! Webhooks are signed with the `webhook-id`, `webhook-timestamp` and
//! `webhook-signature` headers; the signature is base64 HMAC-SHA256 over
//! `"{id}.{timestamp}.{body}"` keyed with the decoded `whsec_` secret.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::retry::{send_with_retry, RetryPolicy};
use super::{
    parse_json, signature, ApprovedCharge, ChargeRequest, CreatedCharge, GatewayError,
    PaymentGateway, WebhookRequest,
};
use crate::entities::payment::PaymentProvider;

pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

#[derive(Clone)]
pub struct YocoGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    webhook_key: Vec<u8>,
    tolerance_secs: u64,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    id: String,
    redirect_url: String,
}

impl YocoGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        webhook_secret: &str,
        tolerance_secs: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
            webhook_key: signature::secret_bytes(webhook_secret),
            tolerance_secs,
            retry,
        }
    }

    fn verify(&self, request: &WebhookRequest) -> Result<(), GatewayError> {
        let id = request
            .header("webhook-id")
            .ok_or_else(|| GatewayError::InvalidSignature("missing webhook-id".into()))?;
        let timestamp = request
            .header("webhook-timestamp")
            .ok_or_else(|| GatewayError::InvalidSignature("missing webhook-timestamp".into()))?;
        let header = request
            .header("webhook-signature")
            .ok_or_else(|| GatewayError::InvalidSignature("missing webhook-signature".into()))?;

        signature::check_timestamp(
            timestamp,
            chrono::Utc::now().timestamp(),
            self.tolerance_secs,
        )?;

        let mut signed = format!("{}.{}.", id, timestamp).into_bytes();
        signed.extend_from_slice(&request.body);

        // Several space-separated "v1,<sig>" entries may be present during key rotation.
        for candidate in header.split_whitespace() {
            let Some(encoded) = candidate.strip_prefix("v1,") else {
                continue;
            };
            let Ok(sig) = STANDARD.decode(encoded) else {
                continue;
            };
            if signature::verify(&self.webhook_key, &signed, &sig)? {
                return Ok(());
            }
        }
        Err(GatewayError::InvalidSignature("signature mismatch".into()))
    }
}

#[async_trait]
impl PaymentGateway for YocoGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Yoco
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        let body = json!({
            "amount": request.amount_in_cents()?,
            "currency": request.currency,
            "successUrl": request.success_url,
            "cancelUrl": request.cancel_url,
            "failureUrl": request.cancel_url,
            "metadata": { "orderId": request.order_id.to_string() },
        });
        let url = format!("{}/api/checkouts", self.base_url);
        let idempotency_key = Uuid::new_v4().to_string();

        let response = send_with_retry(&self.retry, self.provider(), || {
            self.client
                .post(&url)
                .bearer_auth(&self.secret_key)
                .header("Idempotency-Key", &idempotency_key)
                .json(&body)
                .send()
        })
        .await?;

        let meta: Value = response.json().await?;
        let checkout: CheckoutResponse = serde_json::from_value(meta.clone())
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        debug!(checkout_id = %checkout.id, "Yoco checkout created");

        Ok(CreatedCharge {
            external_charge_id: checkout.id,
            redirect_url: checkout.redirect_url,
            provider_meta: meta,
        })
    }

    async fn approve_charge(
        &self,
        request: &WebhookRequest,
    ) -> Result<ApprovedCharge, GatewayError> {
        self.verify(request)?;
        let event = parse_json(&request.body)?;

        if event.get("type").and_then(Value::as_str) != Some(PAYMENT_SUCCEEDED) {
            return Ok(ApprovedCharge::ignored());
        }

        let checkout_id = event
            .pointer("/payload/metadata/checkoutId")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ApprovedCharge {
            charge_id: checkout_id,
            meta: Some(event),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use bytes::Bytes;
    use std::time::Duration;

    const SECRET: &str = "whsec_c2VjcmV0LWtleS1mb3ItdGVzdHM=";

    fn gateway() -> YocoGateway {
        YocoGateway::new(
            reqwest::Client::new(),
            "http://localhost",
            "sk_test",
            SECRET,
            300,
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    fn signed(body: &str, timestamp: i64) -> WebhookRequest {
        let key = signature::secret_bytes(SECRET);
        let sig = signature::sign(&key, format!("msg_1.{}.{}", timestamp, body).as_bytes()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("webhook-id", HeaderValue::from_static("msg_1"));
        headers.insert(
            "webhook-timestamp",
            HeaderValue::from_str(&timestamp.to_string()).unwrap(),
        );
        headers.insert(
            "webhook-signature",
            HeaderValue::from_str(&format!("v0,bogus v1,{}", STANDARD.encode(sig))).unwrap(),
        );
        WebhookRequest {
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn succeeded_payment_yields_checkout_id() {
        let body = r#"{"type":"payment.succeeded","payload":{"id":"p_1","metadata":{"checkoutId":"ch_42"}}}"#;
        let approved = gateway()
            .approve_charge(&signed(body, chrono::Utc::now().timestamp()))
            .await
            .unwrap();
        assert_eq!(approved.charge_id.as_deref(), Some("ch_42"));
        assert!(approved.meta.is_some());
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let body = r#"{"type":"refund.succeeded","payload":{"metadata":{"checkoutId":"ch_42"}}}"#;
        let approved = gateway()
            .approve_charge(&signed(body, chrono::Utc::now().timestamp()))
            .await
            .unwrap();
        assert_eq!(approved, ApprovedCharge::ignored());
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let mut request = signed(r#"{"type":"payment.succeeded"}"#, chrono::Utc::now().timestamp());
        request.body = Bytes::from_static(br#"{"type":"payment.succeeded","x":1}"#);
        let err = gateway().approve_charge(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let request = signed(r#"{"type":"payment.succeeded"}"#, chrono::Utc::now().timestamp() - 3600);
        let err = gateway().approve_charge(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature(_)));
    }
}

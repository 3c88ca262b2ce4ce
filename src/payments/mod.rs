//! Payment gateway adapters.
//!
//! Each provider turns an order into a hosted checkout and turns a signed
//! webhook back into the charge it settles. Nothing here touches the database.

use async_trait::async_trait;
use axum::http::HeaderMap;
use bytes::Bytes;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use uuid::Uuid;

use crate::entities::payment::PaymentProvider;
use crate::errors::ServiceError;

pub mod registry;
pub mod retry;
pub mod signature;
pub mod stripe;
pub mod yoco;

pub use registry::GatewayRegistry;
pub use retry::RetryPolicy;

/// What the gateway needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl ChargeRequest {
    /// Amount in the currency's minor unit.
    pub fn amount_in_cents(&self) -> Result<i64, GatewayError> {
        let cents = (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        match cents.to_i64() {
            Some(cents) if cents > 0 => Ok(cents),
            _ => Err(GatewayError::InvalidAmount(self.amount)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedCharge {
    pub external_charge_id: String,
    pub redirect_url: String,
    pub provider_meta: Value,
}

/// Raw inbound webhook, exactly as received.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Parsed webhook. No `charge_id` means the event is not a successful payment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovedCharge {
    pub charge_id: Option<String>,
    pub meta: Option<Value>,
}

impl ApprovedCharge {
    pub fn ignored() -> Self {
        Self::default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("cannot charge amount {0}")]
    InvalidAmount(Decimal),

    #[error("gateway misconfigured: {0}")]
    Config(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidSignature(msg) => ServiceError::Unauthorized(msg),
            GatewayError::MalformedPayload(msg) => ServiceError::ValidationError(msg),
            GatewayError::InvalidAmount(amount) => {
                ServiceError::ValidationError(format!("cannot charge amount {}", amount))
            }
            GatewayError::Config(msg) => ServiceError::InternalError(msg),
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Opens a hosted checkout. Each call sends a fresh idempotency key that
    /// its retries share.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError>;

    /// Verifies and parses a webhook.
    async fn approve_charge(&self, request: &WebhookRequest)
        -> Result<ApprovedCharge, GatewayError>;
}

/// Shared HTTP client for the gateways.
pub fn http_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()
        .map_err(|e| GatewayError::Config(e.to_string()))
}

fn parse_json(body: &[u8]) -> Result<Value, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
}

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::stripe::StripeGateway;
use super::yoco::YocoGateway;
use super::{http_client, GatewayError, PaymentGateway, RetryPolicy};
use crate::config::PaymentConfig;
use crate::entities::payment::PaymentProvider;
use crate::errors::ServiceError;

/// Resolves a requested payment method to a configured gateway.
#[derive(Clone)]
pub struct GatewayRegistry {
    default_provider: PaymentProvider,
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new(default_provider: PaymentProvider) -> Self {
        Self {
            default_provider,
            gateways: HashMap::new(),
        }
    }

    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    /// Builds a gateway for every provider that has credentials.
    pub fn from_config(cfg: &PaymentConfig) -> Result<Self, GatewayError> {
        let client = http_client()?;
        let retry = RetryPolicy::from_config(cfg);
        let mut registry = Self::new(cfg.default_provider);

        if let Some(creds) = cfg.credentials(PaymentProvider::Yoco) {
            registry = registry.register(Arc::new(YocoGateway::new(
                client.clone(),
                cfg.base_url(PaymentProvider::Yoco),
                creds.secret_key.clone(),
                &creds.webhook_secret,
                cfg.webhook_tolerance_secs,
                retry,
            )));
        }
        if let Some(creds) = cfg.credentials(PaymentProvider::Stripe) {
            registry = registry.register(Arc::new(StripeGateway::new(
                client,
                cfg.base_url(PaymentProvider::Stripe),
                creds.secret_key.clone(),
                creds.webhook_secret.clone(),
                cfg.webhook_tolerance_secs,
                retry,
            )));
        }

        info!(
            default = cfg.default_provider.as_ref(),
            configured = registry.gateways.len(),
            "Payment gateways initialized"
        );
        Ok(registry)
    }

    pub fn default_provider(&self) -> PaymentProvider {
        self.default_provider
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&provider).cloned()
    }

    /// `None` selects the default provider. Unknown or unconfigured methods
    /// are rejected rather than silently falling back.
    pub fn resolve(&self, method: Option<&str>) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        let provider = match method.map(str::trim).filter(|m| !m.is_empty()) {
            None => self.default_provider,
            Some(name) => PaymentProvider::from_str(name).map_err(|_| unsupported())?,
        };
        self.get(provider).ok_or_else(unsupported)
    }
}

fn unsupported() -> ServiceError {
    ServiceError::ValidationError("unsupported payment method".into())
}

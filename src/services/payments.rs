//! Binds gateway adapters to the order and payment ledger.
//!
//! Webhook deliveries may repeat or race; the settleability check here plus
//! the guarded update inside settlement let only one delivery settle. A
//! confirmation that arrives for an order that can no longer settle is still
//! stored on its payment.

use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::orders::ensure_settleable;
use super::settlement::{PaymentConfirmation, SettlementExecutor};
use crate::entities::{order, payment};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::{ChargeRequest, GatewayRegistry, WebhookRequest};
use crate::repositories::{OrderRepository, PaymentRepository};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOrderRequest {
    pub order_id: Uuid,
    /// Gateway to use; the configured default when absent
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "yoco")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChargeResponse {
    /// Hosted checkout page to redirect the customer to
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Not a successful-payment event
    Ignored,
    Settled { order_id: Uuid, payment_id: Uuid },
    /// The order was already settled; nothing more was written
    Duplicate,
    /// Paid after the order expired. The confirmation is stored on the
    /// payment and the order stays expired.
    Expired { order_id: Uuid, payment_id: Uuid },
}

/// Where checkout pages send the customer afterwards.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone)]
pub struct PaymentOrchestrator {
    db: Arc<DatabaseConnection>,
    orders: OrderRepository,
    payments: PaymentRepository,
    gateways: GatewayRegistry,
    settlement: Arc<SettlementExecutor>,
    events: EventSender,
    currency: String,
    urls: CheckoutUrls,
}

impl PaymentOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateways: GatewayRegistry,
        settlement: Arc<SettlementExecutor>,
        events: EventSender,
        currency: impl Into<String>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            payments: PaymentRepository::new(db.clone()),
            db,
            gateways,
            settlement,
            events,
            currency: currency.into(),
            urls,
        }
    }

    /// Opens a hosted checkout for the caller's pending order and records
    /// the charge before handing back the redirect.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_charge(
        &self,
        user_id: Uuid,
        request: ChargeOrderRequest,
    ) -> Result<ChargeResponse, ServiceError> {
        request.validate()?;
        let gateway = self.gateways.resolve(request.method.as_deref())?;

        let order = self
            .orders
            .find_by_id(request.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("order {} not found", request.order_id))
            })?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden("order belongs to another user".into()));
        }
        ensure_settleable(&order)?;

        let charge = ChargeRequest {
            order_id: order.id,
            user_id,
            amount: order.amount,
            currency: self.currency.clone(),
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
        };
        let created = gateway.create_charge(&charge).await.map_err(|e| {
            error!(provider = gateway.provider().as_ref(), error = %e, "Charge creation failed");
            ServiceError::NotFound(format!("Failed to charge order {}", order.id))
        })?;

        let existing = self
            .payments
            .find_by_charge_id(gateway.provider(), &created.external_charge_id)
            .await?;
        let payment = match existing {
            Some(payment) if payment.order_id == order.id => {
                debug!(payment_id = %payment.id, "Gateway returned a recorded charge, reusing it");
                payment
            }
            Some(payment) => {
                error!(
                    payment_id = %payment.id,
                    charge_order_id = %payment.order_id,
                    "Gateway returned a charge recorded for another order"
                );
                return Err(ServiceError::Conflict(format!(
                    "charge {} belongs to another order",
                    created.external_charge_id
                )));
            }
            None => {
                self.payments
                    .create(
                        order.id,
                        gateway.provider(),
                        created.external_charge_id,
                        created.provider_meta,
                    )
                    .await?
            }
        };
        info!(payment_id = %payment.id, provider = gateway.provider().as_ref(), "Charge created");

        Ok(ChargeResponse {
            url: created.redirect_url,
        })
    }

    /// Settles the order a verified success webhook refers to.
    #[instrument(skip(self, request))]
    pub async fn approve_order(
        &self,
        provider: &str,
        request: WebhookRequest,
    ) -> Result<WebhookOutcome, ServiceError> {
        let gateway = self.gateways.resolve(Some(provider))?;
        let approved = gateway.approve_charge(&request).await?;

        let Some(charge_id) = approved.charge_id else {
            counter!("courseware.webhook.ignored", 1);
            debug!("Webhook is not a successful payment, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };

        let payment = self
            .payments
            .find_by_charge_id(gateway.provider(), &charge_id)
            .await?
            .ok_or_else(|| {
                error!(%charge_id, "Webhook references an unknown charge");
                ServiceError::NotFound(format!("no payment for charge {}", charge_id))
            })?;
        let confirmation = PaymentConfirmation {
            payment_id: payment.id,
            execute_meta: approved.meta.unwrap_or(Value::Null),
        };

        let order = self.order_for(&payment).await?;
        if ensure_settleable(&order).is_err() {
            return self.unsettleable(&order, &payment, confirmation).await;
        }

        match self.settlement.execute(&order, Some(confirmation.clone())).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                // Another delivery or the expiry sweep claimed the order first.
                warn!(order_id = %order.id, error = %e, "Settlement lost a race");
                let order = self.order_for(&payment).await?;
                let payment = self
                    .payments
                    .find_by_id(payment.id)
                    .await?
                    .unwrap_or(payment);
                return self.unsettleable(&order, &payment, confirmation).await;
            }
            Err(e) => return Err(e),
        }

        self.events
            .publish(Event::PaymentSucceeded {
                order_id: order.id,
                payment_id: payment.id,
            })
            .await;
        info!(order_id = %order.id, payment_id = %payment.id, "Payment approved");

        Ok(WebhookOutcome::Settled {
            order_id: order.id,
            payment_id: payment.id,
        })
    }

    async fn order_for(&self, payment: &payment::Model) -> Result<order::Model, ServiceError> {
        self.orders
            .find_by_id(payment.order_id)
            .await?
            .ok_or_else(|| {
                error!(payment_id = %payment.id, "Payment references a missing order");
                ServiceError::NotFound(format!("order {} not found", payment.order_id))
            })
    }

    /// Acknowledges a confirmation for an order that is settled or expired.
    /// A payment seen confirmed for the first time keeps the payload, since
    /// the money was taken either way.
    async fn unsettleable(
        &self,
        order: &order::Model,
        payment: &payment::Model,
        confirmation: PaymentConfirmation,
    ) -> Result<WebhookOutcome, ServiceError> {
        if order.is_expired() {
            counter!("courseware.webhook.expired_order", 1);
            error!(
                order_id = %order.id,
                payment_id = %payment.id,
                "Payment confirmed for an expired order; needs a refund"
            );
        } else if payment.execute_meta.is_none() {
            counter!("courseware.webhook.extra_payment", 1);
            error!(
                order_id = %order.id,
                payment_id = %payment.id,
                "Second charge paid for a settled order; needs a refund"
            );
        } else {
            debug!(order_id = %order.id, "Webhook redelivery for a settled order");
        }

        if payment.execute_meta.is_none() {
            self.payments
                .record_execution(self.db.as_ref(), payment.id, confirmation.execute_meta)
                .await?;
        }

        if order.is_expired() {
            Ok(WebhookOutcome::Expired {
                order_id: order.id,
                payment_id: payment.id,
            })
        } else {
            Ok(WebhookOutcome::Duplicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn webhook_outcome_is_tagged() {
        let order_id = Uuid::nil();
        let value = serde_json::to_value(WebhookOutcome::Settled {
            order_id,
            payment_id: order_id,
        })
        .unwrap();
        assert_eq!(value["status"], "settled");
        assert_eq!(
            serde_json::to_value(WebhookOutcome::Ignored).unwrap(),
            json!({ "status": "ignored" })
        );
    }

    #[test]
    fn charge_request_accepts_missing_method() {
        let request: ChargeOrderRequest =
            serde_json::from_value(json!({ "orderId": Uuid::nil() })).unwrap();
        assert!(request.method.is_none());
        assert!(request.validate().is_ok());
    }
}

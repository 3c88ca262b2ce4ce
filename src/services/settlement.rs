//! Exactly-once settlement of a paid order.
//!
//! Callers check that the order is neither expired nor executed before
//! calling in; the executor then re-asserts that guard with a conditional
//! update inside its own transaction, so of two racing settlements only one
//! commits. Everything written here comes from the order's frozen meta; a
//! paid settlement also stores the gateway confirmation and its notification
//! in that same transaction.

use chrono::{DateTime, Months, Utc};
use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::pricing;
use crate::db;
use crate::entities::{
    enrollment::{self, EnrollmentStatus},
    notification::NotificationKind,
    order, product, reward_point, statement, store_order, store_order_item,
};
use crate::errors::ServiceError;
use crate::events::{outbox, Event, EventSender};
use crate::repositories::{
    EnrollmentRepository, EnrollmentStore, LinkedItems, OrderRepository, OrderStore,
    PaymentRepository, PaymentStore, RewardRepository, RewardStore, StatementRepository,
    StatementStore, StoreOrderRepository, StoreOrderStore,
};

/// Rows one settlement will write.
#[derive(Debug, Clone, Default)]
pub struct SettlementPlan {
    pub store_order: Option<store_order::Model>,
    pub store_order_items: Vec<store_order_item::Model>,
    pub enrollments: Vec<enrollment::Model>,
    pub statements: Vec<statement::Model>,
    pub reward: Option<reward_point::Model>,
}

/// Verified gateway confirmation for the charge that paid an order.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub payment_id: Uuid,
    pub execute_meta: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementOutcome {
    pub order_id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub enrollments: usize,
    pub statements: usize,
    pub store_order_id: Option<Uuid>,
    pub reward_points: i64,
}

fn statement(
    order: &order::Model,
    payment_id: Option<Uuid>,
    amount: Decimal,
    now: DateTime<Utc>,
) -> statement::Model {
    statement::Model {
        id: Uuid::new_v4(),
        user_id: order.user_id,
        order_id: order.id,
        amount,
        course_id: None,
        product_id: None,
        bundle_id: None,
        payment_id,
        created_at: now,
    }
}

/// Builds every row settlement writes, reading prices only from the meta.
///
/// Lines whose catalog item is not linked to the order are an integrity
/// failure and abort the whole settlement.
pub fn plan_settlement(
    order: &order::Model,
    linked: &LinkedItems,
    payment_id: Option<Uuid>,
    now: DateTime<Utc>,
    reward_points_per_unit: i64,
) -> Result<SettlementPlan, ServiceError> {
    let products: HashMap<Uuid, &product::Model> =
        linked.products.iter().map(|p| (p.id, p)).collect();
    let courses: HashSet<Uuid> = linked.course_ids.iter().copied().collect();
    let mut plan = SettlementPlan::default();

    if !order.meta.products.is_empty() {
        let store_order_id = Uuid::new_v4();
        let mut total = Decimal::ZERO;
        let mut physical_total = Decimal::ZERO;

        for line in &order.meta.products {
            let product = products.get(&line.id).ok_or_else(|| {
                ServiceError::SettlementFailed(format!(
                    "order {} has product {} in its meta but not in its links",
                    order.id, line.id
                ))
            })?;
            let cost = pricing::product_cost(line);
            total += cost;
            if product.is_physical() {
                physical_total += cost;
            }

            plan.store_order_items.push(store_order_item::Model {
                id: Uuid::new_v4(),
                store_order_id,
                product_id: line.id,
                price: line.price,
                discount: line.price - cost,
            });
            plan.statements.push(statement::Model {
                product_id: Some(line.id),
                ..statement(order, payment_id, cost, now)
            });
        }

        plan.store_order = Some(store_order::Model {
            id: store_order_id,
            order_id: order.id,
            user_id: order.user_id,
            amount: pricing::round_money(total),
            created_at: now,
        });

        let points = physical_total.floor().to_i64().unwrap_or(0) * reward_points_per_unit;
        if points > 0 {
            plan.reward = Some(reward_point::Model {
                id: Uuid::new_v4(),
                user_id: order.user_id,
                order_id: order.id,
                points,
                created_at: now,
            });
        }
    }

    for line in &order.meta.courses {
        if !courses.contains(&line.id) {
            return Err(ServiceError::SettlementFailed(format!(
                "order {} has course {} in its meta but not in its links",
                order.id, line.id
            )));
        }

        if !line.is_bundled() {
            plan.statements.push(statement::Model {
                course_id: Some(line.id),
                ..statement(order, payment_id, pricing::course_cost(line), now)
            });
        }

        let expiry = match line.months {
            Some(months) => Some(now.checked_add_months(Months::new(months)).ok_or_else(|| {
                ServiceError::SettlementFailed(format!(
                    "enrollment expiry out of range for course {}",
                    line.id
                ))
            })?),
            None => None,
        };
        plan.enrollments.push(enrollment::Model {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            course_id: line.id,
            order_id: order.id,
            expiry,
            status: EnrollmentStatus::Active,
            created_at: now,
        });
    }

    for line in pricing::bundle_representatives(&order.meta.courses) {
        plan.statements.push(statement::Model {
            bundle_id: line.bundle_id,
            ..statement(order, payment_id, pricing::bundle_cost(line), now)
        });
    }

    Ok(plan)
}

fn write_failed(order_id: Uuid) -> impl FnOnce(DbErr) -> ServiceError {
    move |e| {
        error!(%order_id, error = %e, "Settlement write failed");
        ServiceError::SettlementFailed(e.to_string())
    }
}

/// Turns a paid order into enrollments, statements and store records.
pub struct SettlementExecutor {
    pub db: Arc<DatabaseConnection>,
    pub orders: Arc<dyn OrderStore>,
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub statements: Arc<dyn StatementStore>,
    pub store_orders: Arc<dyn StoreOrderStore>,
    pub rewards: Arc<dyn RewardStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub events: EventSender,
    pub reward_points_per_unit: i64,
}

impl SettlementExecutor {
    /// Executor backed by the SeaORM repositories.
    pub fn with_repositories(
        db: Arc<DatabaseConnection>,
        events: EventSender,
        reward_points_per_unit: i64,
    ) -> Self {
        Self {
            orders: Arc::new(OrderRepository::new(db.clone())),
            enrollments: Arc::new(EnrollmentRepository),
            statements: Arc::new(StatementRepository),
            store_orders: Arc::new(StoreOrderRepository),
            rewards: Arc::new(RewardRepository),
            payments: Arc::new(PaymentRepository::new(db.clone())),
            db,
            events,
            reward_points_per_unit,
        }
    }

    /// Settles `order` in one transaction. Nothing is written unless
    /// everything is; a lost race comes back as `Conflict`. Free orders pass
    /// no confirmation.
    #[instrument(
        skip(self, order, confirmation),
        fields(order_id = %order.id, payment_id = ?confirmation.as_ref().map(|c| c.payment_id))
    )]
    pub async fn execute(
        &self,
        order: &order::Model,
        confirmation: Option<PaymentConfirmation>,
    ) -> Result<SettlementOutcome, ServiceError> {
        let now = Utc::now();
        let payment_id = confirmation.as_ref().map(|c| c.payment_id);
        let txn = db::begin_serializable(&self.db).await?;

        let outcome = match self.apply(&txn, order, confirmation, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                counter!("courseware.settlement.failed", 1);
                warn!(error = %e, "Settlement rolled back");
                return Err(e);
            }
        };

        db::commit(txn).await.map_err(|e| {
            counter!("courseware.settlement.failed", 1);
            ServiceError::SettlementFailed(e.to_string())
        })?;
        counter!("courseware.settlement.completed", 1);
        info!(
            enrollments = outcome.enrollments,
            statements = outcome.statements,
            "Order settled"
        );

        self.events
            .publish(Event::OrderSettled {
                order_id: order.id,
                payment_id,
                enrollments: outcome.enrollments,
                statements: outcome.statements,
                settled_at: now,
            })
            .await;

        Ok(outcome)
    }

    async fn apply(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
        confirmation: Option<PaymentConfirmation>,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, ServiceError> {
        let payment_id = confirmation.as_ref().map(|c| c.payment_id);
        let claimed = self
            .orders
            .mark_settled(txn, order.id, now)
            .await
            .map_err(write_failed(order.id))?;
        if !claimed {
            return Err(ServiceError::Conflict(format!(
                "order {} is already settled or no longer pending",
                order.id
            )));
        }

        let linked = self
            .orders
            .linked_items(txn, order.id)
            .await
            .map_err(write_failed(order.id))?;
        let plan = plan_settlement(order, &linked, payment_id, now, self.reward_points_per_unit)?;

        let outcome = SettlementOutcome {
            order_id: order.id,
            executed_at: now,
            enrollments: plan.enrollments.len(),
            statements: plan.statements.len(),
            store_order_id: plan.store_order.as_ref().map(|s| s.id),
            reward_points: plan.reward.as_ref().map_or(0, |r| r.points),
        };

        if let Some(store_order) = plan.store_order {
            self.store_orders
                .insert(txn, store_order, plan.store_order_items)
                .await
                .map_err(write_failed(order.id))?;
        }
        if let Some(reward) = plan.reward {
            self.rewards
                .award(txn, reward)
                .await
                .map_err(write_failed(order.id))?;
        }
        self.enrollments
            .insert_all(txn, plan.enrollments)
            .await
            .map_err(write_failed(order.id))?;
        self.statements
            .insert_all(txn, plan.statements)
            .await
            .map_err(write_failed(order.id))?;

        if let Some(confirmation) = confirmation {
            self.payments
                .confirm(txn, confirmation.payment_id, confirmation.execute_meta)
                .await
                .map_err(write_failed(order.id))?;
            outbox::enqueue(
                txn,
                order.user_id,
                Some(order.id),
                NotificationKind::PaymentSucceeded,
                json!({
                    "orderId": order.id,
                    "paymentId": confirmation.payment_id,
                    "amount": order.amount,
                }),
            )
            .await
            .map_err(|e| {
                error!(order_id = %order.id, error = %e, "Settlement notification failed");
                ServiceError::SettlementFailed(e.to_string())
            })?;
        }

        Ok(outcome)
    }
}

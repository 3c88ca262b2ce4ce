use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::eligibility::{check_eligibility, load_enrollments};
use super::order_meta::{resolve_bundles, resolve_courses, resolve_products, BundleLine, CourseLine};
use super::settlement::SettlementExecutor;
use crate::entities::{
    coupon,
    notification::NotificationKind,
    order::{self, OrderMeta, OrderStatus},
};
use crate::errors::ServiceError;
use crate::events::{outbox, Event, EventSender};
use crate::repositories::{NewOrder, OrderRepository};

const MAX_MONTHS: u32 = 36;

/// Free orders younger than this are still being settled by `place_order`.
const FREE_ORDER_RETRY_AFTER_SECS: i64 = 60;
const FREE_ORDER_BATCH: u64 = 50;

/// Cart submitted by the customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    #[validate(length(max = 100, message = "too many products"))]
    pub product_ids: Vec<Uuid>,
    #[serde(default)]
    #[validate(
        length(max = 100, message = "too many courses"),
        custom = "validate_course_lines"
    )]
    pub courses: Vec<CourseLine>,
    #[serde(default)]
    #[validate(
        length(max = 50, message = "too many bundles"),
        custom = "validate_bundle_lines"
    )]
    pub bundles: Vec<BundleLine>,
    #[validate(length(min = 1, max = 64, message = "coupon code must be 1-64 characters"))]
    pub coupon: Option<String>,
}

impl PlaceOrderRequest {
    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty() && self.courses.is_empty() && self.bundles.is_empty()
    }
}

fn validate_months(months: Option<u32>) -> Result<(), ValidationError> {
    match months {
        Some(m) if m == 0 || m > MAX_MONTHS => {
            let mut err = ValidationError::new("months_out_of_range");
            err.message = Some(format!("months must be between 1 and {}", MAX_MONTHS).into());
            Err(err)
        }
        _ => Ok(()),
    }
}

fn validate_course_lines(lines: &Vec<CourseLine>) -> Result<(), ValidationError> {
    lines.iter().try_for_each(|line| validate_months(line.months))
}

fn validate_bundle_lines(lines: &Vec<BundleLine>) -> Result<(), ValidationError> {
    lines.iter().try_for_each(|line| validate_months(line.months))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlacedOrder {
    pub id: Uuid,
    pub amount: Decimal,
    /// `true` when the order cost nothing and was settled immediately
    pub settled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String, example = "Pending")]
    pub status: OrderStatus,
    pub amount: Decimal,
    /// Frozen pricing snapshot
    #[schema(value_type = Object)]
    pub meta: OrderMeta,
    pub executed: Option<DateTime<Utc>>,
    pub coupon_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            status: model.status,
            amount: model.amount,
            meta: model.meta,
            executed: model.executed,
            coupon_id: model.coupon_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Rejects orders that can no longer be settled.
pub fn ensure_settleable(order: &order::Model) -> Result<(), ServiceError> {
    if order.is_expired() {
        return Err(ServiceError::Conflict(format!("order {} has expired", order.id)));
    }
    if order.is_settled() {
        return Err(ServiceError::Conflict(format!(
            "order {} is already completed",
            order.id
        )));
    }
    Ok(())
}

/// Places, reads and expires orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    orders: OrderRepository,
    settlement: Arc<SettlementExecutor>,
    events: EventSender,
    order_expiry: ChronoDuration,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settlement: Arc<SettlementExecutor>,
        events: EventSender,
        order_expiry_hours: i64,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            db,
            settlement,
            events,
            order_expiry: ChronoDuration::hours(order_expiry_hours),
        }
    }

    /// Unknown, inactive and expired codes all behave as "no coupon".
    async fn find_coupon(
        &self,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let found = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?;
        let redeemable = found.filter(|c| c.is_redeemable(now));
        if redeemable.is_none() {
            debug!(code, "Coupon not applicable, pricing without it");
        }
        Ok(redeemable)
    }

    /// Prices the cart, checks eligibility and persists a pending order
    /// together with its placement notification. Free orders settle here.
    #[instrument(skip(self, request))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, ServiceError> {
        request.validate()?;
        if request.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".into()));
        }

        let now = Utc::now();
        let db = &*self.db;
        let coupon = self.find_coupon(request.coupon.as_deref(), now).await?;

        let products = resolve_products(db, &request.product_ids, coupon.as_ref()).await?;
        let direct = resolve_courses(db, &request.courses, coupon.as_ref()).await?;
        let bundled = resolve_bundles(db, &request.bundles).await?;

        let mut course_lines = direct.lines;
        course_lines.extend(bundled.lines);

        let mut course_ids: Vec<Uuid> = course_lines.iter().map(|line| line.id).collect();
        course_ids.sort();
        course_ids.dedup();

        let enrollments = load_enrollments(db, user_id, course_ids.clone()).await?;
        check_eligibility(&course_lines, &enrollments, now)?;

        let meta = OrderMeta::new(products.lines, course_lines);
        if meta.is_empty() {
            return Err(ServiceError::ValidationError(
                "order contains no purchasable items".into(),
            ));
        }

        let new_order = NewOrder {
            user_id,
            meta,
            coupon_id: coupon.as_ref().map(|c| c.id),
            course_ids,
            product_ids: products.products.iter().map(|p| p.id).collect(),
        };

        // Order and notification commit together; dropping the transaction rolls both back.
        let txn = db.begin().await?;
        let order = self.orders.create_order(&txn, new_order).await?;
        outbox::enqueue(
            &txn,
            user_id,
            Some(order.id),
            NotificationKind::OrderPlaced,
            json!({ "orderId": order.id, "amount": order.amount }),
        )
        .await?;
        txn.commit().await?;

        counter!("courseware.orders.placed", 1);
        info!(order_id = %order.id, amount = %order.amount, "Order placed");
        self.events
            .publish(Event::OrderPlaced {
                order_id: order.id,
                user_id,
                amount: order.amount,
            })
            .await;

        let settled = if order.amount <= Decimal::ZERO {
            self.settlement.execute(&order, None).await.map_err(|e| {
                error!(order_id = %order.id, error = %e, "Free order left pending for the sweeper");
                e
            })?;
            true
        } else {
            false
        };

        Ok(PlacedOrder {
            id: order.id,
            amount: order.amount,
            settled,
        })
    }

    /// Loads an order owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden("order belongs to another user".into()));
        }
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (orders, total) = self.orders.list_for_user(user_id, page, per_page).await?;
        Ok(OrderListResponse {
            orders: orders.into_iter().map(OrderResponse::from).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Settles free orders whose settlement at placement failed. Runs
    /// before expiry so a retryable free order is not expired first.
    #[instrument(skip(self))]
    pub async fn settle_free_orders(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - ChronoDuration::seconds(FREE_ORDER_RETRY_AFTER_SECS);
        let pending = self
            .orders
            .unsettled_free_orders(cutoff, FREE_ORDER_BATCH)
            .await?;

        let mut settled = 0;
        for order in pending {
            match self.settlement.execute(&order, None).await {
                Ok(_) => settled += 1,
                Err(e) if e.is_conflict() => {
                    debug!(order_id = %order.id, "Free order already settled")
                }
                Err(e) => {
                    error!(order_id = %order.id, error = %e, "Free order settlement retry failed")
                }
            }
        }
        if settled > 0 {
            info!(count = settled, "Settled free orders left pending");
        }
        Ok(settled)
    }

    /// Marks pending orders older than the configured window as expired.
    #[instrument(skip(self))]
    pub async fn expire_stale_orders(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - self.order_expiry;
        let count = self.orders.expire_created_before(cutoff).await?;
        if count > 0 {
            info!(count, %cutoff, "Expired stale orders");
            self.events.publish(Event::OrdersExpired { count }).await;
        }
        Ok(count)
    }
}

/// Retries free orders and expires stale ones on a fixed interval.
pub fn start_expiry_sweeper(service: OrderService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = service.settle_free_orders().await {
                error!(error = %e, "Free order sweep failed");
            }
            if let Err(e) = service.expire_stale_orders().await {
                error!(error = %e, "Order expiry sweep failed");
            }
        }
    });
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{BaseRepository, LinkedItems, OrderStore, Repository};
use crate::entities::{
    order::{self, Entity as Order, Model as OrderModel, OrderMeta, OrderStatus},
    order_course, order_product, product,
};
use crate::services::pricing;

/// Everything needed to persist a freshly priced order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub meta: OrderMeta,
    pub coupon_id: Option<Uuid>,
    pub course_ids: Vec<Uuid>,
    pub product_ids: Vec<Uuid>,
}

/// Repository for order operations
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Inserts a pending order, its amount computed from the meta, and the
    /// catalog links. Runs on the caller's connection or transaction.
    pub async fn create_order<C: ConnectionTrait>(
        &self,
        db: &C,
        new_order: NewOrder,
    ) -> Result<OrderModel, DbErr> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let amount = pricing::order_amount(&new_order.meta);

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(new_order.user_id),
            status: Set(OrderStatus::Pending),
            amount: Set(amount),
            meta: Set(new_order.meta),
            executed: Set(None),
            coupon_id: Set(new_order.coupon_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        let mut course_ids = new_order.course_ids;
        course_ids.sort();
        course_ids.dedup();
        if !course_ids.is_empty() {
            order_course::Entity::insert_many(course_ids.into_iter().map(|course_id| {
                order_course::ActiveModel {
                    order_id: Set(order_id),
                    course_id: Set(course_id),
                }
            }))
            .exec_without_returning(db)
            .await?;
        }

        let mut product_ids = new_order.product_ids;
        product_ids.sort();
        product_ids.dedup();
        if !product_ids.is_empty() {
            order_product::Entity::insert_many(product_ids.into_iter().map(|product_id| {
                order_product::ActiveModel {
                    order_id: Set(order_id),
                    product_id: Set(product_id),
                }
            }))
            .exec_without_returning(db)
            .await?;
        }

        Ok(order)
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, DbErr> {
        Order::find_by_id(id).one(self.base.get_db()).await
    }

    /// A user's orders, newest first. Pages are 1-based.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), DbErr> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.base.get_db(), per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Expires pending, unexecuted orders created before `cutoff`.
    pub async fn expire_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = Order::update_many()
            .set(order::ActiveModel {
                status: Set(OrderStatus::Expired),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::Executed.is_null())
            .filter(order::Column::CreatedAt.lt(cutoff))
            .exec(self.base.get_db())
            .await?;
        Ok(result.rows_affected)
    }

    /// Pending free orders placed before `cutoff` that never settled.
    pub async fn unsettled_free_orders(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OrderModel>, DbErr> {
        Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::Executed.is_null())
            .filter(order::Column::Amount.lte(Decimal::ZERO))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .order_by_asc(order::Column::CreatedAt)
            .limit(limit)
            .all(self.base.get_db())
            .await
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn mark_settled(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        executed: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = Order::update_many()
            .set(order::ActiveModel {
                status: Set(OrderStatus::Completed),
                executed: Set(Some(executed)),
                updated_at: Set(executed),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Executed.is_null())
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(txn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn linked_items(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<LinkedItems, DbErr> {
        let course_ids = order_course::Entity::find()
            .filter(order_course::Column::OrderId.eq(order_id))
            .all(txn)
            .await?
            .into_iter()
            .map(|link| link.course_id)
            .collect();

        let product_ids: Vec<Uuid> = order_product::Entity::find()
            .filter(order_product::Column::OrderId.eq(order_id))
            .all(txn)
            .await?
            .into_iter()
            .map(|link| link.product_id)
            .collect();

        let products = if product_ids.is_empty() {
            Vec::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(txn)
                .await?
        };

        Ok(LinkedItems {
            course_ids,
            products,
        })
    }
}

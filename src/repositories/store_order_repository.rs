use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait, Set};

use super::StoreOrderStore;
use crate::entities::{store_order, store_order_item};

#[derive(Debug, Clone, Default)]
pub struct StoreOrderRepository;

#[async_trait]
impl StoreOrderStore for StoreOrderRepository {
    async fn insert(
        &self,
        txn: &DatabaseTransaction,
        order: store_order::Model,
        items: Vec<store_order_item::Model>,
    ) -> Result<(), DbErr> {
        store_order::ActiveModel {
            id: Set(order.id),
            order_id: Set(order.order_id),
            user_id: Set(order.user_id),
            amount: Set(order.amount),
            created_at: Set(order.created_at),
        }
        .insert(txn)
        .await?;

        if items.is_empty() {
            return Ok(());
        }
        let rows = items.into_iter().map(|item| store_order_item::ActiveModel {
            id: Set(item.id),
            store_order_id: Set(item.store_order_id),
            product_id: Set(item.product_id),
            price: Set(item.price),
            discount: Set(item.discount),
        });
        store_order_item::Entity::insert_many(rows)
            .exec_without_returning(txn)
            .await?;
        Ok(())
    }
}

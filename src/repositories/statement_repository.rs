use async_trait::async_trait;
use sea_orm::{DatabaseTransaction, DbErr, EntityTrait, Set};

use super::StatementStore;
use crate::entities::statement;

#[derive(Debug, Clone, Default)]
pub struct StatementRepository;

#[async_trait]
impl StatementStore for StatementRepository {
    async fn insert_all(
        &self,
        txn: &DatabaseTransaction,
        statements: Vec<statement::Model>,
    ) -> Result<(), DbErr> {
        if statements.is_empty() {
            return Ok(());
        }

        let rows = statements.into_iter().map(|s| statement::ActiveModel {
            id: Set(s.id),
            user_id: Set(s.user_id),
            order_id: Set(s.order_id),
            amount: Set(s.amount),
            course_id: Set(s.course_id),
            product_id: Set(s.product_id),
            bundle_id: Set(s.bundle_id),
            payment_id: Set(s.payment_id),
            created_at: Set(s.created_at),
        });
        statement::Entity::insert_many(rows)
            .exec_without_returning(txn)
            .await?;
        Ok(())
    }
}

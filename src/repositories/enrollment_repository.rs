use async_trait::async_trait;
use sea_orm::{DatabaseTransaction, DbErr, EntityTrait, Set};

use super::EnrollmentStore;
use crate::entities::enrollment;

#[derive(Debug, Clone, Default)]
pub struct EnrollmentRepository;

#[async_trait]
impl EnrollmentStore for EnrollmentRepository {
    async fn insert_all(
        &self,
        txn: &DatabaseTransaction,
        enrollments: Vec<enrollment::Model>,
    ) -> Result<(), DbErr> {
        if enrollments.is_empty() {
            return Ok(());
        }

        let rows = enrollments.into_iter().map(|e| enrollment::ActiveModel {
            id: Set(e.id),
            user_id: Set(e.user_id),
            course_id: Set(e.course_id),
            order_id: Set(e.order_id),
            expiry: Set(e.expiry),
            status: Set(e.status),
            created_at: Set(e.created_at),
        });
        enrollment::Entity::insert_many(rows)
            .exec_without_returning(txn)
            .await?;
        Ok(())
    }
}

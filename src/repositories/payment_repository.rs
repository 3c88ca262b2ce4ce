use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, Set,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::{BaseRepository, PaymentStore, Repository};
use crate::entities::payment::{self, Entity as Payment, Model as PaymentModel, PaymentProvider};

/// Ledger of gateway charges
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    base: BaseRepository,
}

impl PaymentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn create(
        &self,
        order_id: Uuid,
        provider: PaymentProvider,
        charge_id: String,
        meta: Value,
    ) -> Result<PaymentModel, DbErr> {
        payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            provider: Set(provider),
            charge_id: Set(charge_id),
            meta: Set(meta),
            execute_meta: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.base.get_db())
        .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentModel>, DbErr> {
        Payment::find_by_id(id).one(self.base.get_db()).await
    }

    pub async fn find_by_charge_id(
        &self,
        provider: PaymentProvider,
        charge_id: &str,
    ) -> Result<Option<PaymentModel>, DbErr> {
        Payment::find()
            .filter(payment::Column::Provider.eq(provider))
            .filter(payment::Column::ChargeId.eq(charge_id))
            .one(self.base.get_db())
            .await
    }

    /// Stores the gateway's confirmation payload for audit.
    pub async fn record_execution<C: ConnectionTrait>(
        &self,
        db: &C,
        payment_id: Uuid,
        execute_meta: Value,
    ) -> Result<(), DbErr> {
        payment::ActiveModel {
            id: Set(payment_id),
            execute_meta: Set(Some(execute_meta)),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn confirm(
        &self,
        txn: &DatabaseTransaction,
        payment_id: Uuid,
        execute_meta: Value,
    ) -> Result<(), DbErr> {
        self.record_execution(txn, payment_id, execute_meta).await
    }
}

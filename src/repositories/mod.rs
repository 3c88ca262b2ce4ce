//! Persistence behind narrow, transaction-aware interfaces.
//!
//! Settlement writes go through the `*Store` traits: every method takes the
//! open transaction so one settlement commits or rolls back as a unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{
    enrollment, product, reward_point, statement, store_order, store_order_item,
};

pub mod enrollment_repository;
pub mod order_repository;
pub mod payment_repository;
pub mod reward_repository;
pub mod statement_repository;
pub mod store_order_repository;

pub use enrollment_repository::EnrollmentRepository;
pub use order_repository::{NewOrder, OrderRepository};
pub use payment_repository::PaymentRepository;
pub use reward_repository::RewardRepository;
pub use statement_repository::StatementRepository;
pub use store_order_repository::StoreOrderRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Catalog rows an order was linked to when it was placed.
#[derive(Debug, Clone, Default)]
pub struct LinkedItems {
    pub course_ids: Vec<Uuid>,
    pub products: Vec<product::Model>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Moves a pending, never-executed order to `Completed`.
    /// Returns `false` when another writer got there first.
    async fn mark_settled(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        executed: DateTime<Utc>,
    ) -> Result<bool, DbErr>;

    async fn linked_items(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<LinkedItems, DbErr>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn insert_all(
        &self,
        txn: &DatabaseTransaction,
        enrollments: Vec<enrollment::Model>,
    ) -> Result<(), DbErr>;
}

#[async_trait]
pub trait StatementStore: Send + Sync {
    async fn insert_all(
        &self,
        txn: &DatabaseTransaction,
        statements: Vec<statement::Model>,
    ) -> Result<(), DbErr>;
}

#[async_trait]
pub trait StoreOrderStore: Send + Sync {
    async fn insert(
        &self,
        txn: &DatabaseTransaction,
        order: store_order::Model,
        items: Vec<store_order_item::Model>,
    ) -> Result<(), DbErr>;
}

#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn award(&self, txn: &DatabaseTransaction, reward: reward_point::Model)
        -> Result<(), DbErr>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Stores the gateway's confirmation payload on a recorded charge.
    async fn confirm(
        &self,
        txn: &DatabaseTransaction,
        payment_id: Uuid,
        execute_meta: Value,
    ) -> Result<(), DbErr>;
}

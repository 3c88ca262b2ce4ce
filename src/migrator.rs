use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_coupons_table::Migration),
            Box::new(m20240301_000003_create_orders_tables::Migration),
            Box::new(m20240301_000004_create_settlement_tables::Migration),
            Box::new(m20240301_000005_create_payments_table::Migration),
            Box::new(m20240301_000006_create_notifications_table::Migration),
        ]
    }
}

mod m20240301_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Courses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Courses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Courses::Title).string().not_null())
                        .col(ColumnDef::new(Courses::CategoryId).uuid().null())
                        .col(ColumnDef::new(Courses::Price).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Courses::Billing).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Courses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Bundles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bundles::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bundles::Title).string().not_null())
                        .col(ColumnDef::new(Bundles::Price).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Bundles::Billing).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Bundles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BundleCourses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BundleCourses::BundleId).uuid().not_null())
                        .col(ColumnDef::new(BundleCourses::CourseId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(BundleCourses::BundleId)
                                .col(BundleCourses::CourseId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bundle_courses_bundle")
                                .from(BundleCourses::Table, BundleCourses::BundleId)
                                .to(Bundles::Table, Bundles::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bundle_courses_course")
                                .from(BundleCourses::Table, BundleCourses::CourseId)
                                .to(Courses::Table, Courses::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Title).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::Price).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Products::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Products::Kind).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BundleCourses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Bundles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Courses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Courses {
        Table,
        Id,
        Title,
        CategoryId,
        Price,
        Billing,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Bundles {
        Table,
        Id,
        Title,
        Price,
        Billing,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum BundleCourses {
        Table,
        BundleId,
        CourseId,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Title,
        CategoryId,
        Price,
        Status,
        Kind,
        CreatedAt,
    }
}

mod m20240301_000002_create_coupons_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::Scope).string_len(32).not_null())
                        .col(ColumnDef::new(Coupons::Operator).string_len(32).not_null())
                        .col(ColumnDef::new(Coupons::Discount).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Coupons::Products).json().not_null())
                        .col(ColumnDef::new(Coupons::Courses).json().not_null())
                        .col(ColumnDef::new(Coupons::Categories).json().not_null())
                        .col(
                            ColumnDef::new(Coupons::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Coupons::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Code,
        Scope,
        Operator,
        Discount,
        Products,
        Courses,
        Categories,
        Active,
        ExpiresAt,
        CreatedAt,
    }
}

mod m20240301_000003_create_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::Amount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Meta).json().not_null())
                        .col(
                            ColumnDef::new(Orders::Executed)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::CouponId).uuid().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            // Expiry sweeper scans pending orders by age
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status_created_at")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderCourses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderCourses::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderCourses::CourseId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(OrderCourses::OrderId)
                                .col(OrderCourses::CourseId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_courses_order")
                                .from(OrderCourses::Table, OrderCourses::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderProducts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderProducts::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderProducts::ProductId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(OrderProducts::OrderId)
                                .col(OrderProducts::ProductId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_products_order")
                                .from(OrderProducts::Table, OrderProducts::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderProducts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderCourses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        UserId,
        Status,
        Amount,
        Meta,
        Executed,
        CouponId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderCourses {
        Table,
        OrderId,
        CourseId,
    }

    #[derive(DeriveIden)]
    enum OrderProducts {
        Table,
        OrderId,
        ProductId,
    }
}

mod m20240301_000004_create_settlement_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_settlement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Enrollments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Enrollments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Enrollments::UserId).uuid().not_null())
                        .col(ColumnDef::new(Enrollments::CourseId).uuid().not_null())
                        .col(ColumnDef::new(Enrollments::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(Enrollments::Expiry)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Enrollments::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Enrollments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_enrollments_user_course")
                        .table(Enrollments::Table)
                        .col(Enrollments::UserId)
                        .col(Enrollments::CourseId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Statements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Statements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Statements::UserId).uuid().not_null())
                        .col(ColumnDef::new(Statements::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(Statements::Amount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Statements::CourseId).uuid().null())
                        .col(ColumnDef::new(Statements::ProductId).uuid().null())
                        .col(ColumnDef::new(Statements::BundleId).uuid().null())
                        .col(ColumnDef::new(Statements::PaymentId).uuid().null())
                        .col(
                            ColumnDef::new(Statements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_statements_order_id")
                        .table(Statements::Table)
                        .col(Statements::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StoreOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StoreOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StoreOrders::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(StoreOrders::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(StoreOrders::Amount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StoreOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StoreOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StoreOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StoreOrderItems::StoreOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StoreOrderItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StoreOrderItems::Price)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StoreOrderItems::Discount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_store_order_items_store_order")
                                .from(StoreOrderItems::Table, StoreOrderItems::StoreOrderId)
                                .to(StoreOrders::Table, StoreOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RewardPoints::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RewardPoints::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RewardPoints::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(RewardPoints::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(RewardPoints::Points).big_integer().not_null())
                        .col(
                            ColumnDef::new(RewardPoints::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RewardPoints::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StoreOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StoreOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Statements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Enrollments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Enrollments {
        Table,
        Id,
        UserId,
        CourseId,
        OrderId,
        Expiry,
        Status,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Statements {
        Table,
        Id,
        UserId,
        OrderId,
        Amount,
        CourseId,
        ProductId,
        BundleId,
        PaymentId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StoreOrders {
        Table,
        Id,
        OrderId,
        UserId,
        Amount,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StoreOrderItems {
        Table,
        Id,
        StoreOrderId,
        ProductId,
        Price,
        Discount,
    }

    #[derive(DeriveIden)]
    enum RewardPoints {
        Table,
        Id,
        UserId,
        OrderId,
        Points,
        CreatedAt,
    }
}

mod m20240301_000005_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Provider).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Payments::ChargeId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::Meta).json().not_null())
                        .col(ColumnDef::new(Payments::ExecuteMeta).json().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        OrderId,
        Provider,
        ChargeId,
        Meta,
        ExecuteMeta,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000006_create_notifications_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).uuid().not_null())
                        .col(ColumnDef::new(Notifications::OrderId).uuid().null())
                        .col(ColumnDef::new(Notifications::Kind).string_len(64).not_null())
                        .col(ColumnDef::new(Notifications::Payload).json().not_null())
                        .col(
                            ColumnDef::new(Notifications::DispatchedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_order_id")
                        .table(Notifications::Table)
                        .col(Notifications::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        UserId,
        OrderId,
        Kind,
        Payload,
        DispatchedAt,
        CreatedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");
    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

/// Rolls back the most recent `steps` migrations
pub async fn rollback_migration(db_url: &str, steps: u32) -> Result<()> {
    let db = Database::connect(ConnectOptions::new(db_url)).await?;

    info!(steps, "Rolling back database migrations");
    Migrator::down(&db, Some(steps)).await.map_err(|e| {
        error!("Rollback failed: {}", e);
        e.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::course::{self, BillingType};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};
    use uuid::Uuid;

    #[tokio::test]
    async fn money_columns_migrate_and_keep_fractions_on_sqlite() {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1);
        let db = Database::connect(opt).await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let id = Uuid::new_v4();
        course::ActiveModel {
            id: Set(id),
            title: Set("Precision".into()),
            category_id: Set(None),
            price: Set(dec!(12345678.8125)),
            billing: Set(BillingType::OneTime),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        let stored = course::Entity::find_by_id(id).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.price, dec!(12345678.8125));

        Migrator::down(&db, None).await.unwrap();
    }
}

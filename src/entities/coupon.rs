use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::IdList;

/// Catalog subset a coupon applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum CouponScope {
    #[sea_orm(string_value = "Global")]
    Global,
    #[sea_orm(string_value = "Category")]
    Category,
    #[sea_orm(string_value = "Product")]
    Product,
    #[sea_orm(string_value = "Course")]
    Course,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum CouponOperator {
    #[sea_orm(string_value = "Flat")]
    Flat,
    #[sea_orm(string_value = "Percentage")]
    Percentage,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub scope: CouponScope,
    pub operator: CouponOperator,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount: Decimal,
    /// Product allow-list, consulted when scope is `Product`
    #[sea_orm(column_type = "Json")]
    pub products: IdList,
    /// Course allow-list, consulted when scope is `Course`
    #[sea_orm(column_type = "Json")]
    pub courses: IdList,
    /// Category allow-list, consulted when scope is `Category`
    #[sea_orm(column_type = "Json")]
    pub categories: IdList,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A coupon that is inactive or past its expiry is treated like an unknown code.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

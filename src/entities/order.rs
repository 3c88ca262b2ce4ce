use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Order lifecycle. `Completed` is only reached through settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Expired")]
    Expired,
}

/// Current layout of the `meta` column.
pub const ORDER_META_VERSION: u32 = 1;

/// Priced snapshot of everything the order bought, frozen at placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct OrderMeta {
    #[serde(default = "default_meta_version")]
    pub version: u32,
    #[serde(default)]
    pub products: Vec<ProductMeta>,
    #[serde(default)]
    pub courses: Vec<CourseMeta>,
}

fn default_meta_version() -> u32 {
    ORDER_META_VERSION
}

impl OrderMeta {
    pub fn new(products: Vec<ProductMeta>, courses: Vec<CourseMeta>) -> Self {
        Self {
            version: ORDER_META_VERSION,
            products,
            courses,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.courses.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMeta {
    pub id: Uuid,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<Decimal>,
}

impl ProductMeta {
    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }
}

/// One purchased course. Courses that came from a bundle carry the bundle
/// fields and are priced through the bundle, never individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseMeta {
    pub id: Uuid,
    pub course_title: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_price: Option<Decimal>,
}

impl CourseMeta {
    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }

    pub fn is_bundled(&self) -> bool {
        self.bundle_id.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Json")]
    pub meta: OrderMeta,
    /// Settlement timestamp; set exactly once.
    pub executed: Option<DateTime<Utc>>,
    pub coupon_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_course::Entity")]
    OrderCourses,
    #[sea_orm(has_many = "super::order_product::Entity")]
    OrderProducts,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::order_course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderCourses.def()
    }
}

impl Related<super::order_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderProducts.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_settled(&self) -> bool {
        self.executed.is_some() || self.status == OrderStatus::Completed
    }

    pub fn is_expired(&self) -> bool {
        self.status == OrderStatus::Expired
    }
}

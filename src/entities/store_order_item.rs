use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "store_order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub store_order_id: Uuid,
    pub product_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    /// Amount knocked off `price` by the coupon, zero when none applied.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::store_order::Entity",
        from = "Column::StoreOrderId",
        to = "super::store_order::Column::Id",
        on_delete = "Cascade"
    )]
    StoreOrder,
}

impl Related<super::store_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StoreOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

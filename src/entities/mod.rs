//! SeaORM entities for the catalog, orders and everything settlement writes.

use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

pub mod bundle;
pub mod bundle_course;
pub mod coupon;
pub mod course;
pub mod enrollment;
pub mod notification;
pub mod order;
pub mod order_course;
pub mod order_product;
pub mod payment;
pub mod product;
pub mod reward_point;
pub mod statement;
pub mod store_order;
pub mod store_order_item;

/// JSON array of ids, used for coupon allow-lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct IdList(pub Vec<Uuid>);

impl IdList {
    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }
}

impl From<Vec<Uuid>> for IdList {
    fn from(ids: Vec<Uuid>) -> Self {
        Self(ids)
    }
}

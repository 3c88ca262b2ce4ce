use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, DbErr, Set};

use super::RewardStore;
use crate::entities::reward_point;

#[derive(Debug, Clone, Default)]
pub struct RewardRepository;

#[async_trait]
impl RewardStore for RewardRepository {
    async fn award(
        &self,
        txn: &DatabaseTransaction,
        reward: reward_point::Model,
    ) -> Result<(), DbErr> {
        reward_point::ActiveModel {
            id: Set(reward.id),
            user_id: Set(reward.user_id),
            order_id: Set(reward.order_id),
            points: Set(reward.points),
            created_at: Set(reward.created_at),
        }
        .insert(txn)
        .await?;
        Ok(())
    }
}

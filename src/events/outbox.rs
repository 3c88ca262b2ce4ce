//! Notification outbox. Rows are written on the caller's connection so they
//! commit or roll back together with the business write.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::entities::notification::{self, NotificationKind};
use crate::errors::ServiceError;

/// Enqueue a notification. Pass the open transaction of the write it belongs to.
pub async fn enqueue(
    db: &impl ConnectionTrait,
    user_id: Uuid,
    order_id: Option<Uuid>,
    kind: NotificationKind,
    payload: Value,
) -> Result<Uuid, ServiceError> {
    let id = Uuid::new_v4();
    notification::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        order_id: Set(order_id),
        kind: Set(kind),
        payload: Set(payload),
        dispatched_at: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    debug!(notification_id = %id, kind = ?kind, "Enqueued notification");
    Ok(id)
}

/// Oldest notifications not yet handed to a transport, first.
pub async fn undispatched(
    db: &impl ConnectionTrait,
    limit: u64,
) -> Result<Vec<notification::Model>, ServiceError> {
    Ok(notification::Entity::find()
        .filter(notification::Column::DispatchedAt.is_null())
        .order_by_asc(notification::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await?)
}

pub async fn mark_dispatched(db: &impl ConnectionTrait, ids: Vec<Uuid>) -> Result<u64, ServiceError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = notification::Entity::update_many()
        .set(notification::ActiveModel {
            dispatched_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(notification::Column::Id.is_in(ids))
        .filter(notification::Column::DispatchedAt.is_null())
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Hands pending rows to the dispatch log and stamps `dispatched_at`.
/// Delivery itself belongs to an external transport, which reads that log;
/// a stamped row is not a confirmed delivery.
pub async fn drain_once(db: &DatabaseConnection, batch_size: u64) -> Result<u64, ServiceError> {
    let batch = undispatched(db, batch_size).await?;
    if batch.is_empty() {
        return Ok(0);
    }

    for n in &batch {
        info!(
            notification_id = %n.id,
            user_id = %n.user_id,
            kind = ?n.kind,
            "Dispatching notification"
        );
    }
    mark_dispatched(db, batch.iter().map(|n| n.id).collect()).await
}

/// Background worker polling the outbox.
pub fn start_worker(db: Arc<DatabaseConnection>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = drain_once(&db, 50).await {
                error!("outbox worker error: {}", e);
            }
            sleep(interval).await;
        }
    });
}

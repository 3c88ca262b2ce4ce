use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod outbox;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes after a commit; a closed channel is logged, never surfaced.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Event dropped");
        }
    }
}

/// Things that happened to an order, published after the write committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
    },
    OrderSettled {
        order_id: Uuid,
        payment_id: Option<Uuid>,
        enrollments: usize,
        statements: usize,
        settled_at: DateTime<Utc>,
    },
    PaymentSucceeded {
        order_id: Uuid,
        payment_id: Uuid,
    },
    OrdersExpired {
        count: u64,
    },
}

/// Consumes events until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPlaced {
                order_id,
                user_id,
                amount,
            } => {
                info!(%order_id, %user_id, %amount, "Order placed");
            }
            Event::OrderSettled {
                order_id,
                payment_id,
                enrollments,
                statements,
                ..
            } => {
                info!(
                    %order_id,
                    payment_id = ?payment_id,
                    enrollments,
                    statements,
                    "Order settled"
                );
            }
            Event::PaymentSucceeded {
                order_id,
                payment_id,
            } => {
                info!(%order_id, %payment_id, "Payment succeeded");
            }
            Event::OrdersExpired { count } => {
                info!(count, "Expired stale orders");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::OrdersExpired { count: 1 }).await.is_err());
        sender.publish(Event::OrdersExpired { count: 1 }).await;
    }

    #[tokio::test]
    async fn loop_drains_and_ends() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::PaymentSucceeded {
                order_id: Uuid::new_v4(),
                payment_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        drop(sender);

        process_events(rx).await;
    }
}

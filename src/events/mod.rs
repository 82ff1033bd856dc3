use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events published after a state change has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartItemQuantityChanged {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartCleared {
        user_id: Uuid,
    },
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
        coupon_code: Option<String>,
        placed_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// A checkout attempt was refused for a user-correctable reason
    CheckoutRejected {
        user_id: Uuid,
        reason: String,
    },
    CouponCreated {
        coupon_id: Uuid,
        code: String,
    },
    ReviewAdded {
        review_id: Uuid,
        product_id: Uuid,
        rating: i32,
    },
    WishlistToggled {
        user_id: Uuid,
        product_id: Uuid,
        favorite: bool,
    },
}

impl Event {
    /// Short stable name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::CartItemQuantityChanged { .. } => "cart_item_quantity_changed",
            Event::CartCleared { .. } => "cart_cleared",
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::CheckoutRejected { .. } => "checkout_rejected",
            Event::CouponCreated { .. } => "coupon_created",
            Event::ReviewAdded { .. } => "review_added",
            Event::WishlistToggled { .. } => "wishlist_toggled",
        }
    }
}

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

    /// Sends an event, logging instead of failing when the channel is closed.
    /// The state change the event describes has already been committed.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                user_id,
                total_amount,
                ..
            } => {
                // order confirmation mail would be sent from here
                info!(%order_id, %user_id, %total_amount, "order placed");
            }
            Event::OrderStatusChanged { order_id, from, to } => {
                info!(%order_id, %from, %to, "order status changed");
            }
            Event::CheckoutRejected { user_id, reason } => {
                info!(%user_id, reason = reason.as_str(), "checkout rejected");
            }
            other => debug!(event = other.name(), payload = ?other, "event received"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let user_id = Uuid::new_v4();

        sender.send_or_log(Event::CartCleared { user_id }).await;

        assert_eq!(rx.recv().await, Some(Event::CartCleared { user_id }));
    }

    #[tokio::test]
    async fn closed_channel_does_not_fail_the_caller() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender
            .send(Event::CartCleared {
                user_id: Uuid::new_v4()
            })
            .await
            .is_err());
        sender
            .send_or_log(Event::CartCleared {
                user_id: Uuid::new_v4(),
            })
            .await;
    }

    #[tokio::test]
    async fn processor_exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::CouponCreated {
                coupon_id: Uuid::new_v4(),
                code: "SAVE10".into(),
            })
            .await;
        drop(sender);
        handle.await.unwrap();
    }
}

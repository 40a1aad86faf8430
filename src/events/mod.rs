use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

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
    /// Callers emit only after their transaction has committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events published after a lifecycle change has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CustomerCreated {
        customer_id: Uuid,
        seller_id: Uuid,
    },
    OrderCreated(Uuid),
    PaymentCreated {
        payment_id: Uuid,
        order_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentStatusChanged {
        payment_id: Uuid,
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ShipmentCreated {
        shipping_id: Uuid,
        order_id: Uuid,
    },
    ShipmentStatusChanged {
        shipping_id: Uuid,
        order_id: Uuid,
        new_status: String,
    },
    OrderCompleted(Uuid),
    OrderCancelled {
        order_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Order the event is about, when there is one
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Event::CustomerCreated { .. } => None,
            Event::OrderCreated(id) | Event::OrderCompleted(id) => Some(*id),
            Event::PaymentCreated { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::PaymentStatusChanged { order_id, .. }
            | Event::ShipmentCreated { order_id, .. }
            | Event::ShipmentStatusChanged { order_id, .. }
            | Event::OrderCancelled { order_id, .. } => Some(*order_id),
        }
    }
}

/// Consumes the event channel until every sender has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CustomerCreated {
                customer_id,
                seller_id,
            } => {
                info!(%customer_id, %seller_id, "customer created implicitly at checkout");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, from = %old_status, to = %new_status, "order status changed");
            }
            Event::OrderCancelled { order_id, at } => {
                info!(%order_id, cancelled_at = %at, "order cancelled by purchaser");
            }
            other => {
                info!(order_id = ?other.order_id(), "event: {:?}", other);
            }
        }
    }

    info!("Event channel closed; event processing loop stopped");
}

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the transactional core. Consumers (notification
/// sinks, email collaborators) run outside the transaction; a slow or failed
/// consumer never rolls back the mutation that raised the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    CheckoutCompleted {
        cart_id: Uuid,
        order_id: Uuid,
    },
    PaymentSucceeded {
        payment_id: Uuid,
        order_id: Uuid,
    },
    PaymentFailed {
        payment_id: Uuid,
        order_id: Uuid,
        error_code: Option<String>,
    },
    PaymentRefunded {
        payment_id: Uuid,
        order_id: Uuid,
    },
    RefundFailed {
        payment_id: Uuid,
        order_id: Uuid,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    },
    LowStock {
        product_id: Uuid,
        available: i32,
        threshold: i32,
    },
    PaymentExpired {
        payment_id: Uuid,
        order_id: Uuid,
    },
}

/// Sending half of the bounded domain-event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded queue, returning both halves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Best-effort emit. A full queue or closed channel is logged and
    /// swallowed; event delivery must never fail the calling transaction.
    pub fn emit(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Outbound notification collaborator. Fire-and-forget from the core's
/// point of view.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &Event);
}

/// Default sink that records events in the log stream.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn deliver(&self, event: &Event) {
        info!(?event, "domain event");
    }
}

/// Spawns the worker that drains the queue into the sink. Runs until the
/// sending side is dropped.
pub fn spawn_event_worker(
    mut receiver: mpsc::Receiver<Event>,
    sink: std::sync::Arc<dyn NotificationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            sink.deliver(&event).await;
        }
        info!("event worker shutting down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct RecordingSink {
        seen: Arc<Mutex<Vec<Event>>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, event: &Event) {
            self.seen.lock().await.push(event.clone());
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_into_sink() {
        let (sender, receiver) = EventSender::channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_event_worker(receiver, Arc::new(RecordingSink { seen: seen.clone() }));

        sender.emit(Event::LowStock {
            product_id: Uuid::new_v4(),
            available: 1,
            threshold: 5,
        });
        drop(sender);
        handle.await.unwrap();

        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn emit_on_full_queue_is_swallowed() {
        let (sender, _receiver) = EventSender::channel(1);
        let event = Event::CheckoutCompleted {
            cart_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
        };
        sender.emit(event.clone());
        // Second emit exceeds capacity with no consumer; must not panic.
        sender.emit(event);
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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

    /// Sends an event, logging instead of failing when the channel is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Domain events emitted after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ProductCreated(Uuid),
    BundleCreated {
        bundle_id: Uuid,
        count: usize,
    },
    SaleRecorded {
        sale_id: Uuid,
        product_id: Uuid,
        sale_price: Decimal,
        profit: Decimal,
        remaining_stock: i32,
    },
    ProductSoldOut(Uuid),
    ProductDeleted(Uuid),
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ProductCreated(id) => info!(product_id = %id, "product created"),
            Event::BundleCreated { bundle_id, count } => {
                info!(bundle_id = %bundle_id, count, "bundle expanded")
            }
            Event::SaleRecorded {
                sale_id,
                product_id,
                sale_price,
                profit,
                remaining_stock,
            } => info!(
                sale_id = %sale_id,
                product_id = %product_id,
                sale_price = %sale_price,
                profit = %profit,
                remaining_stock,
                "sale recorded"
            ),
            Event::ProductSoldOut(id) => info!(product_id = %id, "product sold out"),
            Event::ProductDeleted(id) => info!(product_id = %id, "product deleted"),
        }
    }

    info!("Event processing loop stopped");
}

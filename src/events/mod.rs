use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{CartLine, OrderId, Totals};

/// Line item as reported to analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub item_id: String,
    pub item_name: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl From<&CartLine> for EventItem {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: line.product_id.clone(),
            item_name: line.name.clone(),
            price: line.unit_price,
            quantity: line.quantity,
        }
    }
}

/// Lifecycle events sent to the analytics sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CheckoutEvent {
    /// First entry into the payment step.
    BeginCheckout {
        session_id: Uuid,
        currency: String,
        totals: Totals,
        coupon: Option<String>,
        items: Vec<EventItem>,
    },
    OrderCreated {
        session_id: Uuid,
        order_id: OrderId,
        order_number: String,
        currency: String,
        totals: Totals,
    },
    Purchase {
        session_id: Uuid,
        order_id: OrderId,
        order_number: String,
        currency: String,
        totals: Totals,
        payment_method: String,
        settlement_reference: String,
        items: Vec<EventItem>,
    },
}

impl CheckoutEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutEvent::BeginCheckout { .. } => "begin_checkout",
            CheckoutEvent::OrderCreated { .. } => "order_created",
            CheckoutEvent::Purchase { .. } => "purchase",
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            CheckoutEvent::BeginCheckout { session_id, .. }
            | CheckoutEvent::OrderCreated { session_id, .. }
            | CheckoutEvent::Purchase { session_id, .. } => *session_id,
        }
    }
}

/// Fire-and-forget handle onto the analytics channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<CheckoutEvent>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<CheckoutEvent>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting. A full or closed channel drops the
    /// event with a warning; the checkout flow never sees the failure.
    pub fn emit(&self, event: CheckoutEvent) {
        let name = event.name();
        let session_id = event.session_id();
        match self.sender.try_send(event) {
            Ok(()) => debug!(event = name, %session_id, "Analytics event queued"),
            Err(TrySendError::Full(_)) => {
                warn!(event = name, %session_id, "Analytics channel full; event dropped")
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = name, %session_id, "Analytics channel closed; event dropped")
            }
        }
    }
}

/// Creates a bounded analytics channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<CheckoutEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Destination for analytics events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn deliver(&self, event: CheckoutEvent) -> Result<(), ServiceError>;
}

/// Sink that writes each event to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn deliver(&self, event: CheckoutEvent) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        info!(event = event.name(), %payload, "Analytics event");
        Ok(())
    }
}

/// Drains the channel into the sink until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<CheckoutEvent>, sink: Arc<dyn AnalyticsSink>) {
    info!("Starting analytics event loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        let session_id = event.session_id();
        if let Err(e) = sink.deliver(event).await {
            error!(
                "Failed to deliver analytics event: event={}, session_id={}, error={}",
                name, session_id, e
            );
        }
    }

    info!("Analytics event loop stopped");
}

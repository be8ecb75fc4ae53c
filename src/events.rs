//! Lifecycle event emission.
//!
//! The engine publishes through an injected [`EventSink`] so the core stays
//! testable without a live transport. Delivery is fire-and-forget: a sink
//! failure is logged and never fed back into the operation that emitted it.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::dispensary::{DispensaryStatus, Telemetry};
use crate::model::{DispensaryId, OrderId, OrderStatus, SlotId, UserId};

/// Event broadcast channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A lifecycle event, carrying the relevant entity identifiers and new state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    OrderPlaced {
        order_id: OrderId,
        user_id: UserId,
        dispensary_id: DispensaryId,
        status: OrderStatus,
    },
    #[serde(rename_all = "camelCase")]
    OrderStatusChanged {
        order_id: OrderId,
        user_id: UserId,
        status: OrderStatus,
    },
    #[serde(rename_all = "camelCase")]
    ProductDispensed {
        order_id: OrderId,
        dispensary_id: DispensaryId,
        slot_id: SlotId,
        user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    DispensaryStatusChanged {
        dispensary_id: DispensaryId,
        status: DispensaryStatus,
        telemetry: Telemetry,
    },
}

/// Best-effort publish capability handed to the engine.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Sink that fans events out over a tokio broadcast channel.
#[derive(Debug)]
pub struct BroadcastSink {
    event_tx: broadcast::Sender<Event>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { event_tx }
    }

    /// Subscribe to event broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscription as an async stream, for consumers that forward events
    /// to an outbound transport. A lagging consumer observes an error item
    /// instead of slowing the publisher down.
    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.event_tx.subscribe())
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("event broadcast dropped: no active receivers");
        }
    }
}

/// Sink that discards everything; useful when no transport is wired up.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: Event) {}
}

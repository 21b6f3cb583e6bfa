//! Broadcast channel and the delivery loop that drains it.
//!
//! Producers call [`Notifier::notify`]; exactly one delivery loop owns the
//! [`EventStream`] and fans each event out to every registered client.
//!
//! Delivery policy: a client whose send fails is evicted from the registry
//! on that same pass. There is no retry and no dead-letter queue; the other
//! clients still count as delivered.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::{self, BookEvent};
use super::{ClientHandle, ConnectionRegistry};

/// Default queue capacity between producers and the delivery loop.
/// When full, `notify` waits for space instead of dropping events.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Producer side of the broadcast channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::Sender<BookEvent>,
}

/// Consumer side of the broadcast channel. Not `Clone`: only one
/// delivery loop can ever drain it.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<BookEvent>,
}

/// Create a broadcast channel holding at most `capacity` pending events.
pub fn channel(capacity: usize) -> (Notifier, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Notifier { tx }, EventStream { rx })
}

impl Notifier {
    /// Enqueue an event for delivery. Waits while the queue is full.
    pub async fn notify(&self, event: BookEvent) {
        let book_id = event.id;
        if self.tx.send(event).await.is_err() {
            // Only happens once the delivery loop is gone at shutdown
            tracing::warn!(book_id, "Delivery loop stopped, dropping book event");
        }
    }
}

impl EventStream {
    /// Next event in publish order, or `None` once every notifier is dropped.
    pub async fn take(&mut self) -> Option<BookEvent> {
        self.rx.recv().await
    }
}

/// Outcome of fanning out one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub evicted: usize,
}

/// Remove a client whose delivery failed.
fn evict(registry: &ConnectionRegistry, handle: &ClientHandle) -> bool {
    let removed = registry.deregister(handle.id());
    if removed {
        tracing::warn!(connection = %handle.id(), "Delivery failed, evicting client");
    }
    removed
}

/// Send `event` to every client registered right now.
pub fn deliver(registry: &ConnectionRegistry, event: &BookEvent) -> DeliveryReport {
    let frame = match protocol::event_frame(event) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(book_id = event.id, error = %e, "Failed to encode book event");
            return DeliveryReport::default();
        }
    };

    let mut report = DeliveryReport::default();
    registry.for_each(|handle| {
        report.attempted += 1;
        if handle.send(frame.clone()).is_err() && evict(registry, handle) {
            report.evicted += 1;
        }
    });
    report
}

/// Drain `events` until every producer is gone, delivering each in order.
pub async fn run_delivery_loop(mut events: EventStream, registry: ConnectionRegistry) {
    tracing::info!("Delivery loop started");
    while let Some(event) = events.take().await {
        let report = deliver(&registry, &event);
        tracing::debug!(
            book_id = event.id,
            attempted = report.attempted,
            evicted = report.evicted,
            "Book event delivered"
        );
    }
    tracing::info!("Delivery loop stopped");
}

/// Spawn the single delivery loop for this process.
pub fn spawn_delivery_loop(events: EventStream, registry: ConnectionRegistry) -> JoinHandle<()> {
    tokio::spawn(run_delivery_loop(events, registry))
}

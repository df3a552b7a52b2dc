//! Fan-out of watch notifications to independently consumed bounded queues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use acr_core::{Application, ApplicationEvent, EventKind, EventSink};
use arc_swap::ArcSwap;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// What `publish` does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Wait for space. Slow subscribers slow the producer down.
    #[default]
    Block,
    /// Discard the event for that subscriber only.
    DropNewest,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ApplicationEvent>,
}

type Registry = ArcSwap<Vec<Arc<Subscriber>>>;

fn remove(registry: &Registry, ids: &[u64]) {
    registry.rcu(|subs| subs.iter().filter(|s| !ids.contains(&s.id)).cloned().collect::<Vec<_>>());
}

pub struct Broadcaster {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    policy: DeliveryPolicy,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DeliveryPolicy::default())
    }
}

impl Broadcaster {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self { registry: Arc::new(ArcSwap::from_pointee(Vec::new())), next_id: AtomicU64::new(1), policy }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.load().len()
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscriber { id, tx });
        self.registry.rcu(|subs| {
            let mut next = Vec::with_capacity(subs.len() + 1);
            next.extend(subs.iter().cloned());
            next.push(sub.clone());
            next
        });
        debug!(subscriber = id, capacity, "subscribed");
        Subscription { id, rx, registry: Arc::downgrade(&self.registry), released: false }
    }

    /// Disconnect every subscriber. Events already queued stay readable, then
    /// `recv` returns `None`.
    pub fn close(&self) {
        let prev = self.registry.swap(Arc::new(Vec::new()));
        debug!(subscribers = prev.len(), "broadcaster closed");
    }

    /// Deliver `event` to every queue subscribed at the time of the call.
    pub async fn publish(&self, event: ApplicationEvent) {
        counter!("acr_events_received_total", 1u64, "kind" => event.kind.as_str());
        let subs = self.registry.load_full();
        let mut closed = Vec::new();
        for sub in subs.iter() {
            match self.policy {
                DeliveryPolicy::Block => {
                    if sub.tx.send(event.clone()).await.is_err() {
                        closed.push(sub.id);
                    }
                }
                DeliveryPolicy::DropNewest => match sub.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        counter!("acr_broadcast_dropped_total", 1u64);
                        trace!(subscriber = sub.id, "queue full; event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(sub.id),
                },
            }
        }
        if !closed.is_empty() {
            debug!(subscribers = ?closed, "pruning closed queues");
            remove(&self.registry, &closed);
        }
    }
}

#[async_trait::async_trait]
impl EventSink for Broadcaster {
    async fn on_add(&self, app: Application) {
        self.publish(ApplicationEvent::new(EventKind::Added, app)).await
    }

    async fn on_update(&self, app: Application) {
        self.publish(ApplicationEvent::new(EventKind::Modified, app)).await
    }

    async fn on_delete(&self, app: Application) {
        self.publish(ApplicationEvent::new(EventKind::Deleted, app)).await
    }
}

/// One subscriber's queue. Releasing it (explicitly or by drop) stops delivery.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ApplicationEvent>,
    registry: std::sync::Weak<Registry>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event; `None` once released or the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<ApplicationEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ApplicationEvent> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, &[self.id]);
        }
        // Wakes a producer blocked on this queue.
        self.rx.close();
        debug!(subscriber = self.id, "unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

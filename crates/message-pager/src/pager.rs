//! The fan-out machinery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eidc_protocol::{Message, MsgType};
use tokio::sync::{mpsc, Mutex};

use crate::category::Category;

/// Messages a slow subscriber may queue before timed sends start failing.
const QUEUE_CAPACITY: usize = 32;

/// How long a delivery waits on a full subscriber queue before skipping.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_millis(100);

/// Outcome of a single timed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    TimedOut,
    Closed,
}

struct SubscriberRecord {
    id: u64,
    tx: mpsc::Sender<Message>,
}

impl SubscriberRecord {
    async fn try_deliver(&self, msg: &Message, timeout: Duration) -> Delivery {
        match tokio::time::timeout(timeout, self.tx.send(msg.clone())).await {
            Ok(Ok(())) => Delivery::Delivered,
            Ok(Err(_)) => Delivery::Closed,
            Err(_) => Delivery::TimedOut,
        }
    }
}

#[derive(Default)]
struct SubscriberMaps {
    by_type: HashMap<MsgType, Vec<SubscriberRecord>>,
    by_category: HashMap<Category, Vec<SubscriberRecord>>,
}

/// Per-session message fan-out.
///
/// Cloning is cheap; all clones share the same subscriber maps. One lock
/// guards both maps and is held across delivery so that an unsubscribe
/// cannot close a queue mid-send; the per-subscriber timeout bounds how
/// long that can hold things up.
#[derive(Clone)]
pub struct Pager {
    maps: Arc<Mutex<SubscriberMaps>>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new()
    }
}

impl Pager {
    pub fn new() -> Self {
        Self::with_timeout(DELIVERY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            maps: Arc::new(Mutex::new(SubscriberMaps::default())),
            next_id: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    /// Subscribe to specific message types.
    pub async fn subscribe_types(&self, types: &[MsgType]) -> Subscription {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut maps = self.maps.lock().await;
        for t in types {
            maps.by_type.entry(*t).or_default().push(SubscriberRecord {
                id,
                tx: tx.clone(),
            });
        }

        Subscription {
            rx,
            pager: Arc::clone(&self.maps),
            id,
            types: types.to_vec(),
            categories: Vec::new(),
        }
    }

    /// Subscribe to a category; compound categories expand here.
    pub async fn subscribe_category(&self, category: Category) -> Subscription {
        let atoms = category.expand();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut maps = self.maps.lock().await;
        for cat in &atoms {
            maps.by_category
                .entry(*cat)
                .or_default()
                .push(SubscriberRecord {
                    id,
                    tx: tx.clone(),
                });
        }

        Subscription {
            rx,
            pager: Arc::clone(&self.maps),
            id,
            types: Vec::new(),
            categories: atoms,
        }
    }

    /// Deliver `msg` to every matching subscriber.
    ///
    /// Within one subscriber, messages arrive in distribution order; no
    /// ordering is guaranteed across subscribers. Queues found closed
    /// (receiver dropped without unsubscribing) are pruned.
    pub async fn distribute(&self, msg: &Message) {
        let category = Category::of(msg);
        let mut maps = self.maps.lock().await;

        if let Some(records) = maps.by_category.get_mut(&category) {
            deliver_all(records, msg, self.timeout).await;
            if records.is_empty() {
                maps.by_category.remove(&category);
            }
        }

        let msg_type = msg.msg_type();
        if let Some(records) = maps.by_type.get_mut(&msg_type) {
            deliver_all(records, msg, self.timeout).await;
            if records.is_empty() {
                maps.by_type.remove(&msg_type);
            }
        }
    }
}

async fn deliver_all(records: &mut Vec<SubscriberRecord>, msg: &Message, timeout: Duration) {
    let mut closed: Vec<u64> = Vec::new();
    for record in records.iter() {
        match record.try_deliver(msg, timeout).await {
            Delivery::Delivered => {}
            Delivery::TimedOut => {
                tracing::trace!(subscriber = record.id, "pager delivery timed out; skipping");
            }
            Delivery::Closed => closed.push(record.id),
        }
    }
    if !closed.is_empty() {
        records.retain(|r| !closed.contains(&r.id));
    }
}

/// A live subscription: a bounded receive queue plus the bookkeeping to
/// take itself back out of the maps.
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
    pager: Arc<Mutex<SubscriberMaps>>,
    id: u64,
    types: Vec<MsgType>,
    categories: Vec<Category>,
}

impl Subscription {
    /// Next message, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Remove this subscriber from the pager and close its queue. Map
    /// entries left empty are dropped.
    pub async fn unsubscribe(self) {
        let mut maps = self.pager.lock().await;
        for t in &self.types {
            if let Some(records) = maps.by_type.get_mut(t) {
                records.retain(|r| r.id != self.id);
                if records.is_empty() {
                    maps.by_type.remove(t);
                }
            }
        }
        for cat in &self.categories {
            if let Some(records) = maps.by_category.get_mut(cat) {
                records.retain(|r| r.id != self.id);
                if records.is_empty() {
                    maps.by_category.remove(cat);
                }
            }
        }
        // Dropping self.rx closes the queue.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eidc_protocol::Direction;

    fn southbound_heartbeat() -> Message {
        Message::parse(
            &b"GET /eidc/heartbeat?seq=1 HTTP/1.1\r\nHost: h\r\n\r\n"[..],
            Direction::Southbound,
        )
        .unwrap()
    }

    fn northbound_event() -> Message {
        let body = br#"{"eventId":7,"eventType":64}"#;
        let wire = format!(
            "POST /eidc/event HTTP/1.1\r\nHost: h\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            std::str::from_utf8(body).unwrap()
        );
        Message::parse(wire.into_bytes(), Direction::Northbound).unwrap()
    }

    // -----------------------------------------------------------------------
    // routing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn type_subscription_receives_matching_messages() {
        let pager = Pager::new();
        let mut sub = pager.subscribe_types(&[MsgType::HeartbeatRequest]).await;

        pager.distribute(&southbound_heartbeat()).await;
        pager.distribute(&northbound_event()).await;

        let got = sub.recv().await.unwrap();
        assert_eq!(got.msg_type(), MsgType::HeartbeatRequest);
        // The event must not have been queued.
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn compound_category_sees_both_directions() {
        let pager = Pager::new();
        let mut sub = pager.subscribe_category(Category::Any).await;

        pager.distribute(&southbound_heartbeat()).await;
        pager.distribute(&northbound_event()).await;

        assert_eq!(sub.recv().await.unwrap().msg_type(), MsgType::HeartbeatRequest);
        assert_eq!(sub.recv().await.unwrap().msg_type(), MsgType::EventRequest);
    }

    #[tokio::test]
    async fn direction_category_filters() {
        let pager = Pager::new();
        let mut sub = pager.subscribe_category(Category::AnyNorthbound).await;

        pager.distribute(&southbound_heartbeat()).await;
        pager.distribute(&northbound_event()).await;

        assert_eq!(sub.recv().await.unwrap().msg_type(), MsgType::EventRequest);
        assert!(sub.rx.try_recv().is_err());
    }

    // -----------------------------------------------------------------------
    // lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unsubscribe_removes_empty_map_entries() {
        let pager = Pager::new();
        let sub = pager.subscribe_types(&[MsgType::EventRequest]).await;
        sub.unsubscribe().await;

        let maps = pager.maps.lock().await;
        assert!(maps.by_type.is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_distribute() {
        let pager = Pager::new();
        let sub = pager.subscribe_category(Category::AnySouthboundRequest).await;
        drop(sub.rx);
        // First distribution discovers the closed queue and prunes it.
        pager.distribute(&southbound_heartbeat()).await;

        let maps = pager.maps.lock().await;
        assert!(maps.by_category.is_empty());
        drop(maps);

        // A second distribution is a no-op rather than an error.
        pager.distribute(&southbound_heartbeat()).await;
    }

    // -----------------------------------------------------------------------
    // isolation
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn stuck_subscriber_does_not_starve_the_rest() {
        let pager = Pager::new();

        // A subscriber that never reads: fill its queue so sends block.
        let stuck = pager.subscribe_category(Category::AnySouthboundRequest).await;
        for _ in 0..QUEUE_CAPACITY {
            pager.distribute(&southbound_heartbeat()).await;
        }

        let mut healthy: Vec<Subscription> = Vec::new();
        for _ in 0..100 {
            healthy.push(pager.subscribe_category(Category::AnySouthboundRequest).await);
        }

        let before = tokio::time::Instant::now();
        pager.distribute(&southbound_heartbeat()).await;
        let elapsed = before.elapsed();

        // One stuck subscriber costs one timeout, not one per subscriber.
        assert!(elapsed <= DELIVERY_TIMEOUT + Duration::from_millis(50));

        for mut sub in healthy {
            assert!(sub.rx.try_recv().is_ok());
        }
        drop(stuck);
    }
}

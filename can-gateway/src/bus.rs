//! Pub/sub bus interfaces
//!
//! The gateway publishes decoded values through a [`ValueSink`] and reads
//! outbound values through a [`ValueSource`]. [`MemoryBus`] implements both
//! in process: each subscription is a FIFO channel, and every publish is
//! recorded as an [`Update`] that consumers can drain. The update queue is
//! bounded; when nobody drains it, new updates are dropped and counted.

use crate::types::{DecodedValue, OutboundValue, Timestamp};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Updates kept by a [`MemoryBus`] before new ones are dropped
pub const DEFAULT_UPDATE_CAPACITY: usize = 4096;

/// Receiver of decoded inbound values
pub trait ValueSink: Send + Sync {
    /// Publish one value at `path`
    fn publish(&self, path: &str, value: &DecodedValue);
}

/// Origin of outbound values
pub trait ValueSource: Send + Sync {
    /// Open a persistent subscription to `path`
    fn subscribe(&self, path: &str) -> Subscription;

    /// Release a subscription; releasing an unknown id is a no-op
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Identifier of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A FIFO stream of values for one path
///
/// The stream ends once the source releases the subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub path: String,
    receiver: Receiver<OutboundValue>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, path: impl Into<String>, receiver: Receiver<OutboundValue>) -> Self {
        Self {
            id,
            path: path.into(),
            receiver,
        }
    }

    /// Block until the next value, or `None` once the subscription is released
    pub fn recv(&self) -> Option<OutboundValue> {
        self.receiver.recv().ok()
    }

    /// Wait up to `timeout` for the next value
    pub fn recv_timeout(&self, timeout: Duration) -> Result<OutboundValue, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// One published value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    /// Label of the publisher
    #[serde(rename = "$source")]
    pub source: String,
    pub timestamp: Timestamp,
    pub path: String,
    pub value: DecodedValue,
}

/// In-process bus implementing both [`ValueSink`] and [`ValueSource`]
pub struct MemoryBus {
    source: String,
    /// Key: path, Value: live subscriptions on that path
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, Sender<OutboundValue>)>>>,
    next_id: AtomicU64,
    updates_tx: Sender<Update>,
    updates_rx: Receiver<Update>,
    dropped_updates: AtomicU64,
}

impl MemoryBus {
    /// Create a bus whose updates are labelled with `source`
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_capacity(source, DEFAULT_UPDATE_CAPACITY)
    }

    /// Create a bus keeping at most `capacity` undrained updates
    pub fn with_capacity(source: impl Into<String>, capacity: usize) -> Self {
        let (updates_tx, updates_rx) = bounded(capacity.max(1));
        Self {
            source: source.into(),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            updates_tx,
            updates_rx,
            dropped_updates: AtomicU64::new(0),
        }
    }

    /// Deliver a value to every subscription on `path`
    ///
    /// Returns the number of subscriptions that received it.
    pub fn publish_value(&self, path: &str, value: OutboundValue) -> usize {
        let subscribers = self.subscribers.lock();
        let Some(subs) = subscribers.get(path) else {
            log::trace!("No subscribers for {}", path);
            return 0;
        };

        subs.iter()
            .filter(|(_, tx)| tx.send(value.clone()).is_ok())
            .count()
    }

    /// Stream of updates published through the sink side
    ///
    /// The queue must be drained; once it is full new updates are dropped.
    pub fn updates(&self) -> Receiver<Update> {
        self.updates_rx.clone()
    }

    /// Drain the updates published so far
    pub fn drain_updates(&self) -> Vec<Update> {
        self.updates_rx.try_iter().collect()
    }

    /// Number of updates dropped because the queue was full
    pub fn dropped_updates(&self) -> u64 {
        self.dropped_updates.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions on `path`
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.subscribers.lock().get(path).map_or(0, Vec::len)
    }
}

impl ValueSink for MemoryBus {
    fn publish(&self, path: &str, value: &DecodedValue) {
        let update = Update {
            source: self.source.clone(),
            timestamp: chrono::Utc::now(),
            path: path.to_string(),
            value: *value,
        };
        match self.updates_tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                if self.dropped_updates.fetch_add(1, Ordering::Relaxed) == 0 {
                    log::warn!("Update queue full, dropping updates (first: {})", update.path);
                } else {
                    log::trace!("Dropped update for {}", update.path);
                }
            }
            // The bus owns a receiver
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl ValueSource for MemoryBus {
    fn subscribe(&self, path: &str) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .entry(path.to_string())
            .or_default()
            .push((id, tx));
        log::debug!("Subscription {} opened on {}", id, path);
        Subscription::new(id, path, rx)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.lock();
        for subs in subscribers.values_mut() {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
        subscribers.retain(|_, subs| !subs.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_records_update() {
        let bus = MemoryBus::new("test");
        bus.publish("environment.depth.belowTransducer", &DecodedValue::Float(12.5));

        let updates = bus.drain_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].source, "test");
        assert_eq!(updates[0].path, "environment.depth.belowTransducer");
        assert_eq!(updates[0].value, DecodedValue::Float(12.5));
    }

    #[test]
    fn test_undrained_updates_are_bounded() {
        let bus = MemoryBus::with_capacity("test", 2);
        for v in 0..5u32 {
            bus.publish("a", &DecodedValue::UInt(v));
        }

        let values: Vec<_> = bus.drain_updates().into_iter().map(|u| u.value).collect();
        assert_eq!(values, vec![DecodedValue::UInt(0), DecodedValue::UInt(1)]);
        assert_eq!(bus.dropped_updates(), 3);

        bus.publish("a", &DecodedValue::UInt(9));
        assert_eq!(bus.drain_updates().len(), 1);
    }

    #[test]
    fn test_subscription_is_fifo_per_path() {
        let bus = MemoryBus::new("test");
        let sub = bus.subscribe("a");
        let other = bus.subscribe("b");

        assert_eq!(bus.publish_value("a", 1u32.into()), 1);
        assert_eq!(bus.publish_value("a", 2u32.into()), 1);
        assert_eq!(bus.publish_value("c", 3u32.into()), 0);

        assert_eq!(sub.recv(), Some(OutboundValue::from(1u32)));
        assert_eq!(sub.recv(), Some(OutboundValue::from(2u32)));
        assert!(other.recv_timeout(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_unsubscribe_ends_stream_and_is_idempotent() {
        let bus = MemoryBus::new("test");
        let sub = bus.subscribe("a");
        assert_eq!(bus.subscriber_count("a"), 1);

        bus.unsubscribe(sub.id);
        bus.unsubscribe(sub.id);
        bus.unsubscribe(SubscriptionId(999));

        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.publish_value("a", 1u32.into()), 0);
        assert_eq!(sub.recv(), None);
    }

    #[test]
    fn test_update_serialization() {
        let update = Update {
            source: "can-gateway".to_string(),
            timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            path: "a.b".to_string(),
            value: DecodedValue::UInt(7),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["$source"], "can-gateway");
        assert_eq!(json["value"], 7);
    }
}

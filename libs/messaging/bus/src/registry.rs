//! # Subscription Registry
//!
//! Named subscribers, each with a set of topic patterns and a bounded queue.
//! Delivery never blocks the publisher: a subscriber whose queue is full
//! misses the event (logged), and one whose receiver has been dropped is
//! removed on the next delivery attempt.

use crate::error::{BusError, BusResult};
use crate::event::BusEvent;
use crate::topics::{is_valid_pattern, topic_matches};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Subscriber {
    patterns: Vec<String>,
    tx: mpsc::Sender<BusEvent>,
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub subscribers: usize,
    pub patterns: usize,
}

/// Concurrent map of subscriber name to patterns and queue
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: DashMap<String, Subscriber>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for `patterns`, returning its queue
    ///
    /// A name whose previous receiver is gone may be reused.
    pub fn subscribe(
        &self,
        name: &str,
        patterns: &[&str],
        capacity: usize,
    ) -> BusResult<mpsc::Receiver<BusEvent>> {
        if let Some(bad) = patterns.iter().find(|p| !is_valid_pattern(p)) {
            return Err(BusError::InvalidPattern(bad.to_string()));
        }

        if let Some(existing) = self.subscribers.get(name) {
            if !existing.tx.is_closed() {
                return Err(BusError::DuplicateSubscriber(name.to_string()));
            }
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.insert(
            name.to_string(),
            Subscriber {
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                tx,
            },
        );

        info!("Subscriber {} bound to {:?}", name, patterns);
        Ok(rx)
    }

    /// Remove a subscriber and all its patterns
    pub fn unsubscribe(&self, name: &str) -> BusResult<()> {
        match self.subscribers.remove(name) {
            Some(_) => {
                info!("Subscriber {} unsubscribed from all topics", name);
                Ok(())
            }
            None => Err(BusError::UnknownSubscriber(name.to_string())),
        }
    }

    /// Offer `event` to every matching subscriber; returns how many accepted it
    pub fn deliver(&self, event: &BusEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber
                .patterns
                .iter()
                .any(|p| topic_matches(p, &event.routing_key))
            {
                continue;
            }

            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = %entry.key(),
                        routing_key = %event.routing_key,
                        "Subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(entry.key().clone()),
            }
        }

        for name in closed {
            // Re-check under the shard lock so a fresh subscription is kept
            self.subscribers.remove_if(&name, |_, s| s.tx.is_closed());
            debug!("Removed closed subscriber {}", name);
        }

        delivered
    }

    pub fn contains(&self, name: &str) -> bool {
        self.subscribers.contains_key(name)
    }

    /// Number of subscribers whose patterns match `routing_key`
    pub fn subscriber_count(&self, routing_key: &str) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.patterns.iter().any(|p| topic_matches(p, routing_key)))
            .count()
    }

    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            subscribers: self.subscribers.len(),
            patterns: self.subscribers.iter().map(|s| s.patterns.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tracing_test::traced_test;

    fn event(key: &str) -> BusEvent {
        BusEvent::new(key, Bytes::from_static(b"x"))
    }

    #[test]
    fn test_deliver_to_matching_only() {
        let registry = SubscriptionRegistry::new();
        let mut ofp = registry.subscribe("ofp", &["CtlOFPEvent.#"], 8).unwrap();
        let mut ctl = registry.subscribe("ctl", &["CtlTEvent.#"], 8).unwrap();

        assert_eq!(registry.deliver(&event("CtlOFPEvent.4.10.1")), 1);
        assert_eq!(ofp.try_recv().unwrap().routing_key, "CtlOFPEvent.4.10.1");
        assert!(ctl.try_recv().is_err());
        assert_eq!(registry.subscriber_count("CtlTEvent.switch.connected"), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = SubscriptionRegistry::new();
        let _rx = registry.subscribe("app", &["#"], 8).unwrap();
        assert!(matches!(
            registry.subscribe("app", &["#"], 8),
            Err(BusError::DuplicateSubscriber(_))
        ));
    }

    #[test]
    fn test_name_reusable_after_receiver_dropped() {
        let registry = SubscriptionRegistry::new();
        drop(registry.subscribe("app", &["#"], 8).unwrap());
        assert!(registry.subscribe("app", &["#"], 8).is_ok());
    }

    #[test]
    #[traced_test]
    fn test_full_queue_does_not_block() {
        let registry = SubscriptionRegistry::new();
        let mut rx = registry.subscribe("slow", &["#"], 1).unwrap();
        assert_eq!(registry.deliver(&event("AppTEvent.a")), 1);
        assert_eq!(registry.deliver(&event("AppTEvent.b")), 0);
        assert_eq!(rx.try_recv().unwrap().routing_key, "AppTEvent.a");
        assert!(rx.try_recv().is_err());
        assert!(logs_contain("Subscriber queue full"));
    }

    #[test]
    fn test_closed_subscriber_removed() {
        let registry = SubscriptionRegistry::new();
        drop(registry.subscribe("gone", &["#"], 4).unwrap());
        assert_eq!(registry.deliver(&event("AppTEvent.a")), 0);
        assert!(!registry.contains("gone"));
    }

    #[test]
    fn test_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let _rx = registry.subscribe("app", &["CtlOFPEvent.#", "CtlTEvent.#"], 4).unwrap();
        assert_eq!(registry.stats(), SubscriptionStats { subscribers: 1, patterns: 2 });
        registry.unsubscribe("app").unwrap();
        assert!(matches!(
            registry.unsubscribe("app"),
            Err(BusError::UnknownSubscriber(_))
        ));
        assert_eq!(registry.stats(), SubscriptionStats::default());
    }

    #[test]
    fn test_invalid_pattern() {
        let registry = SubscriptionRegistry::new();
        assert!(matches!(
            registry.subscribe("app", &["CtlOFPEvent..#"], 4),
            Err(BusError::InvalidPattern(_))
        ));
    }
}

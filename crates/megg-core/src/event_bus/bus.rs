//! Broadcaster implementation.
//!
//! Fans serialized events out to every registered observer and prunes
//! observers whose delivery channel has gone away.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::Event;

/// Handle identifying a registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Create a new unique observer ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Obs({})", &self.0.to_string()[..8])
    }
}

/// Receiving end handed to an observer at registration
///
/// Each message is one serialized event. Dropping the receiver makes the
/// next delivery to this observer fail, which unregisters it.
pub type ObserverReceiver = mpsc::UnboundedReceiver<Arc<str>>;

/// Error types for broadcaster operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BroadcastError {
    /// The observer is not registered
    #[error("Observer {0} is not registered")]
    UnknownObserver(ObserverId),
    /// The observer's channel is closed; it has been pruned
    #[error("Observer {0} is gone")]
    ObserverGone(ObserverId),
    /// The event could not be serialized
    #[error("Failed to serialize event: {0}")]
    Serialization(String),
}

/// Single fan-out point for events to observers
#[derive(Default)]
pub struct Broadcaster {
    observers: RwLock<HashMap<ObserverId, mpsc::UnboundedSender<Arc<str>>>>,
}

impl Broadcaster {
    /// Create an empty broadcaster
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer
    pub fn register(&self) -> (ObserverId, ObserverReceiver) {
        let id = ObserverId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let total = {
            let mut observers = self.observers.write();
            observers.insert(id, tx);
            observers.len()
        };
        tracing::info!("Observer {} registered (total: {})", id, total);
        (id, rx)
    }

    /// Unregister an observer
    ///
    /// Returns true if the observer was found and removed.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let (removed, remaining) = {
            let mut observers = self.observers.write();
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            tracing::info!("Observer {} unregistered (remaining: {})", id, remaining);
        }
        removed
    }

    /// Publish an event to every registered observer
    ///
    /// The event is serialized once. Observers whose delivery fails are
    /// removed during this call. Returns the number of observers reached.
    pub fn publish(&self, event: &Event) -> usize {
        let payload: Arc<str> = match event.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!("Failed to serialize {} event: {}", event.kind(), e);
                return 0;
            }
        };

        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|id, tx| match tx.send(payload.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Pruning observer {} after failed delivery", id);
                false
            }
        });
        let delivered = observers.len();
        if delivered < before {
            tracing::info!(
                "Pruned {} dead observer(s) while publishing {}",
                before - delivered,
                event.kind()
            );
        }
        delivered
    }

    /// Deliver an event to a single observer
    pub fn send_to(&self, id: ObserverId, event: &Event) -> Result<(), BroadcastError> {
        let payload: Arc<str> = event
            .to_json()
            .map_err(|e| BroadcastError::Serialization(e.to_string()))?
            .into();

        let delivered = {
            let observers = self.observers.read();
            let tx = observers
                .get(&id)
                .ok_or(BroadcastError::UnknownObserver(id))?;
            tx.send(payload).is_ok()
        };

        if delivered {
            Ok(())
        } else {
            self.unregister(id);
            Err(BroadcastError::ObserverGone(id))
        }
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let bus = Broadcaster::new();
        let (id, _rx) = bus.register();
        assert_eq!(bus.observer_count(), 1);

        assert!(bus.unregister(id));
        assert_eq!(bus.observer_count(), 0);

        // Double unregister should return false
        assert!(!bus.unregister(id));
    }

    #[test]
    fn test_publish_reaches_every_observer() {
        let bus = Broadcaster::new();
        let (_a, mut rx_a) = bus.register();
        let (_b, mut rx_b) = bus.register();

        assert_eq!(bus.publish(&Event::error("boom")), 2);

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert_eq!(&*a, r#"{"type":"error","message":"boom"}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_publish_prunes_dropped_observers() {
        let bus = Broadcaster::new();
        let (_live, mut live_rx) = bus.register();
        let (_dead, dead_rx) = bus.register();
        drop(dead_rx);

        assert_eq!(bus.publish(&Event::pong()), 1);
        assert_eq!(bus.observer_count(), 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_send_to_single_observer() {
        let bus = Broadcaster::new();
        let (a, mut rx_a) = bus.register();
        let (_b, mut rx_b) = bus.register();

        bus.send_to(a, &Event::pong()).unwrap();
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_send_to_gone_observer_unregisters() {
        let bus = Broadcaster::new();
        let (a, rx_a) = bus.register();
        drop(rx_a);

        assert_eq!(
            bus.send_to(a, &Event::pong()),
            Err(BroadcastError::ObserverGone(a))
        );
        assert_eq!(bus.observer_count(), 0);
        assert_eq!(
            bus.send_to(a, &Event::pong()),
            Err(BroadcastError::UnknownObserver(a))
        );
    }

    #[test]
    fn test_observer_id_display() {
        let id = ObserverId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("Obs("));
        assert_eq!(shown.len(), "Obs(12345678)".len());
    }
}

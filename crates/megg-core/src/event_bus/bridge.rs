//! Hand-off from producers on any thread to the broadcaster.
//!
//! Producers (the blocking serial reader, the calibration router, the work
//! process) hold an [`EventSink`]. Events go into one unbounded queue and a
//! single task on the async runtime drains it, publishing in enqueue order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::bus::Broadcaster;
use super::events::Event;

/// Producer side of the event bridge
///
/// Cheap to clone; `emit` never blocks and may be called from blocking
/// worker threads as well as async tasks.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    /// Create a sink together with the raw receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sink whose events are silently discarded
    pub fn disconnected() -> Self {
        let (sink, _rx) = Self::channel();
        sink
    }

    /// Queue an event for publication
    ///
    /// Returns false if the drain loop is gone; the event is dropped.
    pub fn emit(&self, event: Event) -> bool {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::trace!("Dropping {} event, bridge is closed", kind);
                false
            }
        }
    }
}

/// Consumer side of the event bridge
#[derive(Debug)]
pub struct EventBridge {
    handle: JoinHandle<()>,
}

impl EventBridge {
    /// Spawn the drain loop on the current runtime
    pub fn spawn(broadcaster: Arc<Broadcaster>) -> (EventSink, EventBridge) {
        let (sink, mut rx) = EventSink::channel();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let reached = broadcaster.publish(&event);
                tracing::trace!("Published {} to {} observer(s)", event.kind(), reached);
            }
            tracing::debug!("Event bridge drained and closed");
        });
        (sink, EventBridge { handle })
    }

    /// Stop the drain loop
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_from_blocking_thread_keep_order() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (_id, mut rx) = broadcaster.register();
        let (sink, bridge) = EventBridge::spawn(broadcaster.clone());

        let producer = sink.clone();
        tokio::task::spawn_blocking(move || {
            for i in 0..20 {
                producer.emit(Event::error(format!("line {i}")));
            }
        })
        .await
        .unwrap();

        for i in 0..20 {
            let json = rx.recv().await.unwrap();
            assert_eq!(
                &*json,
                format!(r#"{{"type":"error","message":"line {i}"}}"#)
            );
        }
        bridge.shutdown();
    }

    #[test]
    fn test_disconnected_sink_drops_events() {
        let sink = EventSink::disconnected();
        assert!(!sink.emit(Event::pong()));
    }
}

//! Broadcast publisher for engine events.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use supervisor::{Event, EventPublisher, PublishError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const BROADCAST_CAPACITY: usize = 256;

/// Errors seen by an [`EventReceiver`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecvError {
    /// Every publisher handle was dropped.
    #[error("event channel closed")]
    Closed,
    /// The receiver fell behind and missed events.
    #[error("receiver lagged, {0} events skipped")]
    Lagged(u64),
}

/// Fans engine events out to every subscriber.
///
/// Publishing with nobody listening is not an error: the engine never
/// depends on delivery.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Event>,
    client_count: Arc<AtomicUsize>,
}

impl BroadcastPublisher {
    /// Creates a publisher with an empty channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            client_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribes a new listener.
    pub fn subscribe(&self) -> EventReceiver {
        self.client_count.fetch_add(1, Ordering::SeqCst);
        debug!(client_count = self.client_count(), "Subscriber attached");
        EventReceiver {
            inner: self.sender.subscribe(),
            client_count: Arc::clone(&self.client_count),
        }
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let kind = event.kind;
        if let Ok(receiver_count) = self.sender.send(event) {
            debug!(%kind, receiver_count, "Event broadcast");
        } else {
            debug!(%kind, "Event dropped, no subscribers");
        }
        Ok(())
    }
}

/// Receiving half handed out by [`BroadcastPublisher::subscribe`].
pub struct EventReceiver {
    inner: broadcast::Receiver<Event>,
    client_count: Arc<AtomicUsize>,
}

impl EventReceiver {
    /// Waits for the next event.
    ///
    /// # Errors
    /// Returns `RecvError::Lagged` when events were skipped (the receiver stays
    /// usable) and `RecvError::Closed` once the channel is gone.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.inner.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => RecvError::Closed,
            broadcast::error::RecvError::Lagged(count) => {
                warn!(skipped = count, "Receiver lagged");
                RecvError::Lagged(count)
            }
        })
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.client_count.fetch_sub(1, Ordering::SeqCst);
        debug!(
            client_count = self.client_count.load(Ordering::SeqCst),
            "Subscriber detached"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor::EventKind;

    fn event(subject: &str) -> Event {
        Event::new(EventKind::TaskUpdated, subject, serde_json::json!({}))
    }

    #[tokio::test]
    async fn tracks_subscriber_count() {
        let publisher = BroadcastPublisher::new();
        assert_eq!(publisher.client_count(), 0);

        let rx1 = publisher.subscribe();
        let _rx2 = publisher.subscribe();
        assert_eq!(publisher.client_count(), 2);

        drop(rx1);
        assert_eq!(publisher.client_count(), 1);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() -> Result<(), RecvError> {
        let publisher = BroadcastPublisher::new();
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();

        publisher.publish(event("TASK-001")).unwrap();

        assert_eq!(a.recv().await?.subject_id, "TASK-001");
        assert_eq!(b.recv().await?.subject_id, "TASK-001");
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::new();
        assert!(publisher.publish(event("TASK-001")).is_ok());
    }

    #[tokio::test]
    async fn slow_receiver_reports_lag() {
        let publisher = BroadcastPublisher::new();
        let mut rx = publisher.subscribe();
        for n in 0..=BROADCAST_CAPACITY {
            publisher.publish(event(&format!("TASK-{n:03}"))).unwrap();
        }

        assert_eq!(rx.recv().await, Err(RecvError::Lagged(1)));
        assert!(rx.recv().await.is_ok());
    }
}

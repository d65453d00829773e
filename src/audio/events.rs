// Playback events published to the UI layer
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Everything the controller reports about a running session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// Current position, sent on every poll tick and whenever playback (re)starts
    TimestampChange { offset: f64, duration: f64 },
    /// The session played to its natural end
    Ended,
}

/// Fan-out of player events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn timestamp_change(&self, offset: f64, duration: f64) {
        // No subscribers is fine
        let _ = self.tx.send(PlayerEvent::TimestampChange { offset, duration });
    }

    pub(crate) fn ended(&self) {
        let _ = self.tx.send(PlayerEvent::Ended);
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side handed to subscribers
pub struct EventSubscription {
    rx: broadcast::Receiver<PlayerEvent>,
}

impl EventSubscription {
    /// Next event, or None once the player is gone
    ///
    /// A subscriber that falls behind skips the ticks it missed rather than erroring.
    pub async fn recv(&mut self) -> Option<PlayerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant used for draining
    pub fn try_recv(&mut self) -> Option<PlayerEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_events_in_order() {
        let notifier = EventNotifier::new();
        let mut sub = notifier.subscribe();

        notifier.timestamp_change(1.0, 10.0);
        notifier.ended();

        assert_eq!(
            sub.recv().await,
            Some(PlayerEvent::TimestampChange { offset: 1.0, duration: 10.0 })
        );
        assert_eq!(sub.recv().await, Some(PlayerEvent::Ended));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&PlayerEvent::TimestampChange {
            offset: 2.5,
            duration: 10.0,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"timestampChange","offset":2.5,"duration":10.0}"#);
        assert_eq!(serde_json::to_string(&PlayerEvent::Ended).unwrap(), r#"{"type":"ended"}"#);
    }

    #[tokio::test]
    async fn test_closed_notifier_ends_subscription() {
        let notifier = EventNotifier::new();
        let mut sub = notifier.subscribe();
        drop(notifier);
        assert_eq!(sub.recv().await, None);
    }
}

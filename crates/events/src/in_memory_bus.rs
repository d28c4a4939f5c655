//! In-memory notifier for tests/dev.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, trace};

use crate::bus::{Notifier, NotifierError, StoreEvent, Subscription, Topic};

#[derive(Debug)]
struct Subscriber {
    topic: Topic,
    tx: UnboundedSender<StoreEvent>,
}

#[derive(Debug, Default)]
struct State {
    subscribers: Vec<Subscriber>,
    disconnected: bool,
}

/// In-memory notifier.
///
/// - Fan-out to every live subscription whose topic matches
/// - Dropped subscriptions are pruned on the next publish
/// - `disconnect` ends all subscriptions, like a lost backend connection
///
/// The in-memory record store publishes into this on every mutation.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    state: Mutex<State>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every matching subscription.
    pub fn publish(&self, event: StoreEvent) -> Result<(), NotifierError> {
        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;

        // Drop dead subscribers while publishing.
        state.subscribers.retain(|sub| {
            let alive = if sub.topic.matches(&event) {
                sub.tx.send(event.clone()).is_ok()
            } else {
                !sub.tx.is_closed()
            };
            if !alive {
                trace!(topic = ?sub.topic, "pruning closed subscription");
            }
            alive
        });

        Ok(())
    }

    /// Number of subscriptions that are still open.
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.subscribers.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .map(|state| !state.disconnected)
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Notifier for InMemoryNotifier {
    async fn subscribe(&self, topic: Topic) -> Result<Subscription, NotifierError> {
        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        if state.disconnected {
            return Err(NotifierError::Connection("notifier is disconnected".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber { topic, tx });

        Ok(Subscription::new(rx))
    }

    async fn connect(&self) -> Result<(), NotifierError> {
        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        state.disconnected = false;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NotifierError> {
        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        state.disconnected = true;
        debug!(subscribers = state.subscribers.len(), "in-memory notifier disconnected");
        // Dropping the senders ends every open subscription.
        state.subscribers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_matching_events() {
        let notifier = InMemoryNotifier::new();
        let mut fields = notifier.subscribe(Topic::field_set("jobs:a")).await.unwrap();
        let mut created = notifier.subscribe(Topic::key_created("jobs:")).await.unwrap();

        notifier
            .publish(StoreEvent::KeyCreated { key: "jobs:a".into() })
            .unwrap();
        notifier
            .publish(StoreEvent::FieldSet { key: "jobs:a".into() })
            .unwrap();
        notifier
            .publish(StoreEvent::FieldSet { key: "jobs:b".into() })
            .unwrap();

        assert_eq!(
            created.try_recv().unwrap(),
            StoreEvent::KeyCreated { key: "jobs:a".into() }
        );
        assert!(created.try_recv().is_err());

        assert_eq!(
            fields.try_recv().unwrap(),
            StoreEvent::FieldSet { key: "jobs:a".into() }
        );
        assert!(fields.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let notifier = InMemoryNotifier::new();
        let sub = notifier.subscribe(Topic::field_set("jobs:a")).await.unwrap();
        assert_eq!(notifier.subscriber_count(), 1);

        drop(sub);
        assert_eq!(notifier.subscriber_count(), 0);

        // Publishing to an abandoned subscription is a no-op, not an error.
        notifier
            .publish(StoreEvent::FieldSet { key: "jobs:a".into() })
            .unwrap();
    }

    #[tokio::test]
    async fn disconnect_ends_subscriptions_until_reconnect() {
        let notifier = InMemoryNotifier::new();
        let mut sub = notifier.subscribe(Topic::key_created("jobs:")).await.unwrap();

        notifier.disconnect().await.unwrap();
        assert_eq!(sub.recv().await, None);
        assert!(matches!(
            notifier.subscribe(Topic::key_created("jobs:")).await,
            Err(NotifierError::Connection(_))
        ));

        notifier.connect().await.unwrap();
        assert!(notifier.subscribe(Topic::key_created("jobs:")).await.is_ok());
    }
}

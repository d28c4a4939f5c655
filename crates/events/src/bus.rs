//! Change-notification abstraction (mechanics only).
//!
//! A [`Notifier`] delivers [`StoreEvent`]s for a [`Topic`]:
//!
//! - **Field-set on key K**: any field of record K changed.
//! - **Key created under prefix P**: a new record appeared in a namespace.
//!
//! ## Delivery Guarantees
//!
//! Delivery is **at-least-once** and **not transactionally linked** to the
//! store mutation that caused it:
//!
//! - Events may be duplicated, delayed, or (across reconnects) lost
//! - Events carry only the key; they never carry record data
//! - Subscribers must re-read the store after every event
//!
//! Events published before a subscription is established are not replayed,
//! so callers subscribe first and read the store afterwards.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Any field mutation on exactly this key.
    FieldSet { key: String },
    /// Creation of any key starting with `prefix`.
    KeyCreated { prefix: String },
}

impl Topic {
    pub fn field_set(key: impl Into<String>) -> Self {
        Self::FieldSet { key: key.into() }
    }

    pub fn key_created(prefix: impl Into<String>) -> Self {
        Self::KeyCreated {
            prefix: prefix.into(),
        }
    }

    pub fn matches(&self, event: &StoreEvent) -> bool {
        match (self, event) {
            (Topic::FieldSet { key }, StoreEvent::FieldSet { key: changed }) => key == changed,
            (Topic::KeyCreated { prefix }, StoreEvent::KeyCreated { key }) => {
                key.starts_with(prefix.as_str())
            }
            _ => false,
        }
    }
}

/// A change observed on the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    FieldSet { key: String },
    KeyCreated { key: String },
}

impl StoreEvent {
    pub fn key(&self) -> &str {
        match self {
            StoreEvent::FieldSet { key } | StoreEvent::KeyCreated { key } => key,
        }
    }
}

/// Notifier failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifierError {
    /// The notifier cannot reach its backend (or has been disconnected).
    #[error("notifier connection error: {0}")]
    Connection(String),

    /// The backend refused the subscription.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Internal lock poisoning.
    #[error("notifier state poisoned")]
    Poisoned,
}

impl NotifierError {
    pub fn is_connection(&self) -> bool {
        matches!(self, NotifierError::Connection(_))
    }
}

/// A live subscription to one topic.
///
/// Dropping the subscription tears it down: the channel closes and any
/// forwarding task is aborted, so events arriving afterwards are discarded
/// rather than surfaced anywhere.
#[derive(Debug)]
pub struct Subscription {
    receiver: UnboundedReceiver<StoreEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(receiver: UnboundedReceiver<StoreEvent>) -> Self {
        Self {
            receiver,
            forwarder: None,
        }
    }

    /// A subscription fed by a background task that must stop with it.
    pub fn with_forwarder(receiver: UnboundedReceiver<StoreEvent>, forwarder: JoinHandle<()>) -> Self {
        Self {
            receiver,
            forwarder: Some(forwarder),
        }
    }

    /// Wait for the next event. `None` means the notifier side has gone away.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.receiver.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Result<StoreEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// `Ok(None)` means the notifier side closed; `Err(_)` means the wait elapsed.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<StoreEvent>, Elapsed> {
        tokio::time::timeout(timeout, self.receiver.recv()).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Transport-agnostic change notifier.
///
/// `connect`/`disconnect` bracket the notifier's lifetime; implementations
/// with nothing to open may keep the defaults. After `disconnect`, existing
/// subscriptions end (`recv` returns `None`) and `subscribe` fails with
/// [`NotifierError::Connection`] until the next `connect`.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Start receiving events for `topic`.
    ///
    /// When this returns, the subscription is established: every matching
    /// event published afterwards is delivered (subject to the guarantees above).
    async fn subscribe(&self, topic: Topic) -> Result<Subscription, NotifierError>;

    async fn connect(&self) -> Result<(), NotifierError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NotifierError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    async fn subscribe(&self, topic: Topic) -> Result<Subscription, NotifierError> {
        (**self).subscribe(topic).await
    }

    async fn connect(&self) -> Result<(), NotifierError> {
        (**self).connect().await
    }

    async fn disconnect(&self) -> Result<(), NotifierError> {
        (**self).disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_set_topic_matches_exact_key_only() {
        let topic = Topic::field_set("embed:a");
        assert!(topic.matches(&StoreEvent::FieldSet { key: "embed:a".into() }));
        assert!(!topic.matches(&StoreEvent::FieldSet { key: "embed:ab".into() }));
        assert!(!topic.matches(&StoreEvent::KeyCreated { key: "embed:a".into() }));
    }

    #[test]
    fn key_created_topic_matches_prefix() {
        let topic = Topic::key_created("embed:");
        assert!(topic.matches(&StoreEvent::KeyCreated { key: "embed:a/b".into() }));
        assert!(!topic.matches(&StoreEvent::KeyCreated { key: "other:a".into() }));
        assert!(!topic.matches(&StoreEvent::FieldSet { key: "embed:a/b".into() }));
    }

    #[tokio::test]
    async fn dropping_subscription_aborts_forwarder() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if tx.send(StoreEvent::FieldSet { key: "k".into() }).is_err() {
                    return;
                }
            }
        });
        let abort = forwarder.abort_handle();

        let sub = Subscription::with_forwarder(rx, forwarder);
        drop(sub);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(abort.is_finished());
    }
}

//! Redis keyspace-notification notifier.
//!
//! Topics map onto Redis pub/sub patterns:
//!
//! | topic                 | pattern                      | message payload |
//! |-----------------------|------------------------------|-----------------|
//! | field-set on `K`      | `__keyspace@{db}__:K`        | command (`hset`) |
//! | key created under `P` | `__keyevent@{db}__:hset`     | the key          |
//!
//! Redis has no hash-specific "key created" event, so key-created
//! subscriptions hear every hash write in the namespace (prefix-filtered
//! here). That over-delivers, which the at-least-once contract allows: the
//! claim step ignores jobs someone already claimed.
//!
//! Note: Redis pub/sub is not durable. Messages published while a
//! subscriber is reconnecting are lost; producers bound their wait with a
//! timeout for that reason.

use std::sync::Mutex;

use redis::Msg;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::AbortHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use linkpeek_events::{Notifier, NotifierError, StoreEvent, Subscription, Topic};

#[derive(Debug, Default)]
struct State {
    connected: bool,
    forwarders: Vec<AbortHandle>,
}

/// Notifier backed by Redis keyspace notifications.
///
/// Each subscription owns a dedicated pub/sub connection and a forwarding
/// task; dropping the [`Subscription`] aborts the task and closes the
/// connection. `disconnect` aborts every forwarder this notifier started.
#[derive(Debug)]
pub struct RedisKeyspaceNotifier {
    client: redis::Client,
    database: Option<u32>,
    state: Mutex<State>,
}

impl RedisKeyspaceNotifier {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, NotifierError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| NotifierError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            database: None,
            state: Mutex::new(State::default()),
        })
    }

    /// Only listen to events from one logical database (default: all).
    pub fn with_database(mut self, database: u32) -> Self {
        self.database = Some(database);
        self
    }

    fn database_pattern(&self) -> String {
        self.database
            .map(|db| db.to_string())
            .unwrap_or_else(|| "*".to_string())
    }

    /// Pub/sub pattern that carries events for `topic`.
    pub fn channel_pattern(&self, topic: &Topic) -> String {
        let db = self.database_pattern();
        match topic {
            Topic::FieldSet { key } => format!("__keyspace@{db}__:{key}"),
            Topic::KeyCreated { .. } => format!("__keyevent@{db}__:hset"),
        }
    }

    fn ensure_connected(&self) -> Result<(), NotifierError> {
        let state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        if state.connected {
            Ok(())
        } else {
            Err(NotifierError::Connection("redis notifier is not connected".into()))
        }
    }
}

#[async_trait::async_trait]
impl Notifier for RedisKeyspaceNotifier {
    async fn subscribe(&self, topic: Topic) -> Result<Subscription, NotifierError> {
        self.ensure_connected()?;

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| NotifierError::Connection(e.to_string()))?;

        let pattern = self.channel_pattern(&topic);
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(|e| NotifierError::Subscribe(format!("PSUBSCRIBE {pattern} failed: {e}")))?;
        debug!(%pattern, "subscribed");

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                if !forward(&topic, &msg, &tx) {
                    return;
                }
            }
            warn!(%pattern, "notification stream ended");
        });

        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        state.forwarders.retain(|handle| !handle.is_finished());
        state.forwarders.push(forwarder.abort_handle());

        Ok(Subscription::with_forwarder(rx, forwarder))
    }

    async fn connect(&self) -> Result<(), NotifierError> {
        // Fail fast on a bad URL / unreachable server instead of on first subscribe.
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| NotifierError::Connection(e.to_string()))?;

        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NotifierError> {
        let mut state = self.state.lock().map_err(|_| NotifierError::Poisoned)?;
        state.connected = false;
        for handle in state.forwarders.drain(..) {
            handle.abort();
        }
        Ok(())
    }
}

/// Translate one pub/sub message; returns `false` once the subscriber is gone.
fn forward(topic: &Topic, msg: &Msg, tx: &UnboundedSender<StoreEvent>) -> bool {
    let event = match topic {
        Topic::FieldSet { key } => match msg.get_payload::<String>() {
            Ok(command) if command == "hset" => StoreEvent::FieldSet { key: key.clone() },
            _ => return true,
        },
        Topic::KeyCreated { .. } => match msg.get_payload::<String>() {
            Ok(key) => StoreEvent::KeyCreated { key },
            Err(_) => return true,
        },
    };

    if !topic.matches(&event) {
        return true;
    }

    tx.send(event).is_ok()
}

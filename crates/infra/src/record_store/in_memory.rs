use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use linkpeek_core::RecordFields;
use linkpeek_events::{InMemoryNotifier, StoreEvent};

use super::r#trait::{RecordStore, StoreError};

#[derive(Debug)]
struct Entry {
    fields: RecordFields,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory record store.
///
/// Intended for tests/dev. Every operation runs under one lock, which makes
/// the conditional operations atomic. Mutations are published to the paired
/// [`InMemoryNotifier`] while the lock is held, so notifications arrive in
/// mutation order. Expiry is evaluated lazily against tokio's clock (paused
/// test time applies).
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<String, Entry>>,
    notifier: Arc<InMemoryNotifier>,
    connected: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new(notifier: Arc<InMemoryNotifier>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            notifier,
            connected: AtomicBool::new(true),
        }
    }

    pub fn notifier(&self) -> &Arc<InMemoryNotifier> {
        &self.notifier
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .lock()
            .map(|records| records.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every later operation fail as if the backend went away.
    ///
    /// Unlike `disconnect`, the owner is not told; it finds out from the
    /// next failing operation.
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connection("in-memory store is disconnected".into()))
        }
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> T,
    ) -> Result<T, StoreError> {
        self.ensure_connected()?;
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;

        let now = Instant::now();
        records.retain(|_, entry| !entry.is_expired(now));

        Ok(f(&mut records))
    }

    fn publish(&self, event: StoreEvent) {
        if let Err(err) = self.notifier.publish(event) {
            warn!(error = %err, "in-memory store failed to publish notification");
        }
    }

    /// Set a field if absent, creating the key when needed. Returns whether the field was set.
    fn set_if_absent_locked(
        &self,
        records: &mut HashMap<String, Entry>,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> bool {
        let created = !records.contains_key(key);
        let entry = records.entry(key.to_string()).or_insert_with(|| Entry {
            fields: RecordFields::new(),
            expires_at: None,
        });

        if entry.fields.contains_key(field) {
            return false;
        }

        entry.fields.insert(field.to_string(), value.to_string());
        if let Some(ttl) = ttl {
            entry.expires_at = Some(Instant::now() + ttl);
        }

        if created {
            self.publish(StoreEvent::KeyCreated { key: key.to_string() });
        }
        self.publish(StoreEvent::FieldSet { key: key.to_string() });
        true
    }

    /// Write every field in one mutation, creating the key when needed.
    fn write_locked(
        &self,
        records: &mut HashMap<String, Entry>,
        key: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) {
        let created = !records.contains_key(key);
        let entry = records.entry(key.to_string()).or_insert_with(|| Entry {
            fields: RecordFields::new(),
            expires_at: None,
        });

        for (field, value) in fields {
            entry.fields.insert(field.to_string(), value.to_string());
        }

        if created {
            entry.expires_at = ttl.map(|ttl| Instant::now() + ttl);
            self.publish(StoreEvent::KeyCreated { key: key.to_string() });
        }
        self.publish(StoreEvent::FieldSet { key: key.to_string() });
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.with_records(|records| self.set_if_absent_locked(records, key, field, value, None))
    }

    async fn set_existing_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.with_records(|records| {
            records.contains_key(key) && self.set_if_absent_locked(records, key, field, value, None)
        })
    }

    async fn read_fields(&self, key: &str) -> Result<RecordFields, StoreError> {
        self.with_records(|records| {
            records
                .get(key)
                .map(|entry| entry.fields.clone())
                .unwrap_or_default()
        })
    }

    async fn write_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }

        self.with_records(|records| self.write_locked(records, key, fields, None))
    }

    async fn write_fields_if_absent(
        &self,
        key: &str,
        guard: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.with_records(|records| {
            if records.get(key).is_some_and(|entry| entry.fields.contains_key(guard)) {
                return false;
            }
            self.write_locked(records, key, fields, ttl);
            true
        })
    }

    async fn create_and_read(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<RecordFields, StoreError> {
        self.with_records(|records| {
            self.set_if_absent_locked(records, key, field, value, ttl);
            records
                .get(key)
                .map(|entry| entry.fields.clone())
                .unwrap_or_default()
        })
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

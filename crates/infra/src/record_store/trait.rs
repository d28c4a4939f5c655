use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use linkpeek_core::RecordFields;

/// Record store operation error.
///
/// ## Error Categories
///
/// - **Connection**: the backend is unreachable or the adapter is disconnected.
///   Fatal to the owning coordinator, which tears down its store and notifier.
/// - **Command**: the backend rejected one operation (wrong type, script error).
/// - **Poisoned**: internal lock poisoning (in-memory store only).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("store state poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Key-value record store (one flat string map per key).
///
/// ## Atomicity
///
/// The conditional operations (`set_field_if_absent`,
/// `set_existing_field_if_absent`, `write_fields_if_absent`, `create_and_read`)
/// must be atomic at the store: when several processes race on the same key
/// and field, exactly one of them observes `true` / performs the create. This is the only mutual
/// exclusion the coordination layer has; there are no in-process locks.
///
/// ## Notifications
///
/// Every successful field write must produce a field-set notification for
/// the key, and creating a key must produce a key-created notification, on
/// whatever notifier is paired with this store.
///
/// ## Lifecycle
///
/// `connect`/`disconnect` are paired with the notifier's. Operations on a
/// disconnected store fail with [`StoreError::Connection`].
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Set `field` to `value` only if the field is absent. Returns whether the set happened.
    async fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Like `set_field_if_absent`, but never creates `key`: a missing key reads as "not set".
    async fn set_existing_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Read every field of `key`. A missing key reads as an empty map.
    async fn read_fields(&self, key: &str) -> Result<RecordFields, StoreError>;

    /// Write a batch of fields in one operation (one notification).
    async fn write_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Write a batch of fields in one operation only while `guard` is absent.
    ///
    /// Returns whether the write happened. When it creates `key` and `ttl` is
    /// given, the key expires after `ttl`.
    async fn write_fields_if_absent(
        &self,
        key: &str,
        guard: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// In one indivisible step: set `field` if absent, then read the whole record.
    ///
    /// When `ttl` is given and this call created the field, the key expires
    /// after `ttl`. An existing key's expiry is never touched.
    async fn create_and_read(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<RecordFields, StoreError>;

    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        (**self).set_field_if_absent(key, field, value).await
    }

    async fn set_existing_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        (**self).set_existing_field_if_absent(key, field, value).await
    }

    async fn read_fields(&self, key: &str) -> Result<RecordFields, StoreError> {
        (**self).read_fields(key).await
    }

    async fn write_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        (**self).write_fields(key, fields).await
    }

    async fn write_fields_if_absent(
        &self,
        key: &str,
        guard: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        (**self).write_fields_if_absent(key, guard, fields, ttl).await
    }

    async fn create_and_read(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<RecordFields, StoreError> {
        (**self).create_and_read(key, field, value, ttl).await
    }

    async fn connect(&self) -> Result<(), StoreError> {
        (**self).connect().await
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        (**self).disconnect().await
    }
}

//! Redis-backed record store (one hash per job key).
//!
//! - Conditional create is `HSETNX`
//! - Batch write is `HSET key f1 v1 f2 v2 ...` (one `hset` notification)
//! - Create-and-read, guarded writes and existing-key claims run as Lua
//!   scripts so no other client can interleave between the check and the write
//!
//! Notifications come from Redis keyspace events; see
//! [`RedisKeyspaceNotifier`](crate::event_bus::RedisKeyspaceNotifier). With
//! `configure_keyspace_events` enabled, `connect` turns them on server-side.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use linkpeek_core::RecordFields;

use super::r#trait::{RecordStore, StoreError};

/// Keyspace (`K`) and keyevent (`E`) notifications for hash commands (`h`).
pub const KEYSPACE_EVENTS: &str = "KEh";

const CREATE_AND_READ: &str = r#"
local created = redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2])
local ttl = tonumber(ARGV[3])
if created == 1 and ttl > 0 then
  redis.call('PEXPIRE', KEYS[1], ttl)
end
return redis.call('HGETALL', KEYS[1])
"#;

const SET_EXISTING_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
return redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2])
"#;

const WRITE_IF_ABSENT: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
  return 0
end
local created = redis.call('EXISTS', KEYS[1]) == 0
redis.call('HSET', KEYS[1], unpack(ARGV, 3))
local ttl = tonumber(ARGV[2])
if created and ttl > 0 then
  redis.call('PEXPIRE', KEYS[1], ttl)
end
return 1
"#;

pub struct RedisRecordStore {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    create_and_read: redis::Script,
    set_existing_if_absent: redis::Script,
    write_if_absent: redis::Script,
    configure_keyspace_events: bool,
}

impl core::fmt::Debug for RedisRecordStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisRecordStore")
            .field("client", &self.client)
            .field("configure_keyspace_events", &self.configure_keyspace_events)
            .finish_non_exhaustive()
    }
}

impl RedisRecordStore {
    /// Create a store for `redis_url` (e.g. `"redis://localhost:6379"`). Nothing is opened until `connect`.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(store_error)?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            create_and_read: redis::Script::new(CREATE_AND_READ),
            set_existing_if_absent: redis::Script::new(SET_EXISTING_IF_ABSENT),
            write_if_absent: redis::Script::new(WRITE_IF_ABSENT),
            configure_keyspace_events: false,
        })
    }

    /// Issue `CONFIG SET notify-keyspace-events KEh` when connecting.
    pub fn with_keyspace_events(mut self, enabled: bool) -> Self {
        self.configure_keyspace_events = enabled;
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Connection("redis store is not connected".into()))
    }
}

#[async_trait::async_trait]
impl RecordStore for RedisRecordStore {
    #[instrument(skip(self, value), err)]
    async fn set_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        conn.hset_nx(key, field, value).await.map_err(store_error)
    }

    #[instrument(skip(self, value), err)]
    async fn set_existing_field_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let set: i64 = self
            .set_existing_if_absent
            .key(key)
            .arg(field)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(set == 1)
    }

    async fn read_fields(&self, key: &str) -> Result<RecordFields, StoreError> {
        let mut conn = self.connection().await?;
        conn.hgetall(key).await.map_err(store_error)
    }

    #[instrument(skip(self, fields), err)]
    async fn write_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        conn.hset_multiple(key, fields).await.map_err(store_error)
    }

    #[instrument(skip(self, fields), err)]
    async fn write_fields_if_absent(
        &self,
        key: &str,
        guard: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        if fields.is_empty() {
            return Ok(false);
        }

        let mut conn = self.connection().await?;
        let mut invocation = self.write_if_absent.prepare_invoke();
        invocation.key(key).arg(guard).arg(ttl_millis(ttl));
        for (field, value) in fields {
            invocation.arg(*field).arg(*value);
        }

        let written: i64 = invocation.invoke_async(&mut conn).await.map_err(store_error)?;
        Ok(written == 1)
    }

    #[instrument(skip(self, value), err)]
    async fn create_and_read(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<RecordFields, StoreError> {
        let mut conn = self.connection().await?;

        self.create_and_read
            .key(key)
            .arg(field)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn connect(&self) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(store_error)?;

        if self.configure_keyspace_events {
            redis::cmd("CONFIG")
                .arg("SET")
                .arg("notify-keyspace-events")
                .arg(KEYSPACE_EVENTS)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(store_error)?;
            debug!(flags = KEYSPACE_EVENTS, "enabled keyspace notifications");
        }

        *self.connection.write().await = Some(conn);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        // Dropping the last handle closes the multiplexed connection.
        self.connection.write().await.take();
        Ok(())
    }
}

/// Script argument for an optional expiry; `0` means none.
fn ttl_millis(ttl: Option<Duration>) -> u64 {
    ttl.map(|ttl| ttl.as_millis().max(1) as u64).unwrap_or(0)
}

fn store_error(err: redis::RedisError) -> StoreError {
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() || err.is_timeout() {
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

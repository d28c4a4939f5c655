//! Record store boundary.
//!
//! The store holds one flat field map per job key and provides the atomic
//! primitives the coordinator relies on. See [`RecordStore`].

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_hash;
pub mod r#trait;

pub use in_memory::InMemoryRecordStore;
#[cfg(feature = "redis")]
pub use redis_hash::RedisRecordStore;
pub use r#trait::{RecordStore, StoreError};

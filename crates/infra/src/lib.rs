//! Infrastructure layer: record stores, notifiers, job coordination, config.

pub mod config;
pub mod coordinator;
pub mod event_bus;
pub mod record_store;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use coordinator::{CoordinatorConfig, CoordinatorError, InMemoryCoordinator, JobCoordinator};
pub use record_store::{InMemoryRecordStore, RecordStore, StoreError};
pub use workers::{JobListener, shutdown_signal};

#[cfg(feature = "redis")]
pub use coordinator::RedisCoordinator;
#[cfg(feature = "redis")]
pub use event_bus::RedisKeyspaceNotifier;
#[cfg(feature = "redis")]
pub use record_store::RedisRecordStore;

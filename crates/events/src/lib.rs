//! Store change notifications.
//!
//! Parties never talk to each other directly; they watch the store. This
//! crate defines what can be watched ([`Topic`]), what arrives
//! ([`StoreEvent`]), how it arrives ([`Subscription`]) and who delivers it
//! ([`Notifier`]). Backend-specific notifiers live in `linkpeek-infra`.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{Notifier, NotifierError, StoreEvent, Subscription, Topic};
pub use in_memory_bus::InMemoryNotifier;

//! `linkpeek-core`: job coordination primitives.
//!
//! This crate contains **pure** building blocks (no IO): how a job domain is
//! bound to store keys and payload strings, and how a stored record maps onto
//! the `waiting → claimed → complete` lifecycle.

pub mod binding;
pub mod error;
pub mod key;
pub mod record;

pub use binding::{JobBinding, TextBinding};
pub use error::{CodecError, CodecResult};
pub use key::JobKey;
pub use record::{JobRecord, JobState, RecordFields};

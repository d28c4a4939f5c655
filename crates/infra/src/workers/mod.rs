//! Background workers.

pub mod job_listener;
pub mod signal;

pub use job_listener::JobListener;
pub use signal::shutdown_signal;

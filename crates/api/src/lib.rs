//! HTTP producer: serves link previews for posts, backed by the job coordinator.

pub mod app;

//! Embed worker: claims embed jobs, renders previews, publishes results.

pub mod processor;
pub mod renderer;

pub use processor::process;
pub use renderer::{HttpPostRenderer, PostRenderer};

//! Post embed domain.
//!
//! Identifies a post to preview (project handle, slug, render flags) and
//! describes the preview produced for it. Pure domain logic: no IO.

pub mod binding;
pub mod data;
pub mod id;

pub use binding::{EMBED_NAMESPACE, EmbedBinding};
pub use data::{EmbedData, PostMeta, Screenshot};
pub use id::{EmbedJobId, Flag, Flags, IdError};

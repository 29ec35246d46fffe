//! mp-core: shared errors, media types, codec tables, ids, and configuration.
//!
//! This crate is the foundational dependency for all other mp-* crates,
//! providing a unified error type, the track/file metadata model handed over
//! by introspection, codec alias and container compatibility tables,
//! type-safe run identifiers, and workflow configuration.

pub mod codecs;
pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorKind, IncompatibleTrack, Result};
pub use ids::*;
pub use media::*;

//! # zapper-core
//!
//! Core types, traits, and retention policy for file-zapper.
//!
//! This crate provides the attachment and artifact data model, the storage
//! collaborator traits the engines are written against, and the retention
//! configuration shared by the deduplicator and the disposer.

pub mod config;
pub mod content;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{parse_cutoff, RetentionPolicy};
pub use content::{compute_content_hash, detect_content_type, with_extension_suffix};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

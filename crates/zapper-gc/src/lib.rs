//! # zapper-gc
//!
//! Space reclamation for stored attachments.
//!
//! Two engines share the primitives in [`lifecycle`]:
//!
//! - [`Deduplicator`] swaps an attachment's own bytes for a shared
//!   placeholder while keeping dependent attachments intact.
//! - [`Disposer`] sweeps generated artifacts (exports, migrations, SIS
//!   batches, soft-deleted files) past their retention cutoff, deleting rows
//!   in foreign-key safe order.
//!
//! [`FileZapper`] wires both to a term-based candidate search.
//!
//! ## Example
//!
//! ```rust,ignore
//! use zapper_gc::{FileZapper, PlaceholderAssets, Stores};
//! use zapper_core::{RetentionPolicy, TermIdentifier};
//!
//! let zapper = FileZapper::new(stores, RetentionPolicy::from_env(), PlaceholderAssets::from_env()).await?;
//! let report = zapper
//!     .replace_course_files(&TermIdentifier::SisSourceId("2019-FALL".into()))
//!     .await?;
//! tracing::info!(replaced = report.replaced, "done");
//! ```

use std::sync::Arc;

use zapper_core::{
    ArtifactRepository, AttachmentRepository, ContentStore, ContextDirectory, TermResolver,
};

pub mod candidates;
pub mod dedup;
pub mod disposer;
pub mod lifecycle;
pub mod memory;
mod paging;
pub mod placeholder;
pub mod report;
pub mod zapper;

pub use candidates::{CandidateCollector, SubmissionExtras};
pub use dedup::{Deduplicator, ReplaceOutcome};
pub use disposer::{Destroyed, Disposer};
pub use memory::MemoryStore;
pub use placeholder::{PlaceholderAssets, PlaceholderKey, PlaceholderRegistry};
pub use report::{DisposalReport, ReplaceReport, SweepReport};
pub use zapper::FileZapper;

/// Every storage collaborator the engines talk to.
#[derive(Clone)]
pub struct Stores {
    pub attachments: Arc<dyn AttachmentRepository>,
    pub content: Arc<dyn ContentStore>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub terms: Arc<dyn TermResolver>,
    pub directory: Arc<dyn ContextDirectory>,
}

impl Stores {
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        content: Arc<dyn ContentStore>,
        artifacts: Arc<dyn ArtifactRepository>,
        terms: Arc<dyn TermResolver>,
        directory: Arc<dyn ContextDirectory>,
    ) -> Self {
        Self {
            attachments,
            content,
            artifacts,
            terms,
            directory,
        }
    }

    /// Use one in-memory store for every collaborator.
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            attachments: store.clone(),
            content: store.clone(),
            artifacts: store.clone(),
            terms: store.clone(),
            directory: store,
        }
    }
}

//! Core traits for file-zapper collaborators.
//!
//! The engines only talk to storage through these traits; Postgres and
//! filesystem implementations live in `zapper-db`, an in-memory one in
//! `zapper-gc`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// ATTACHMENT METADATA
// =============================================================================

/// Repository for attachment rows.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Fetch one attachment. Always reads through to storage.
    async fn get(&self, id: Uuid) -> Result<Option<Attachment>>;

    /// Fetch every existing attachment among `ids`. Missing ids are skipped.
    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>>;

    /// One keyset page of attachments matching `filter`, ordered by id,
    /// starting strictly after `after`.
    async fn find_page(
        &self,
        filter: &AttachmentFilter,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Attachment>>;

    /// Find a root attachment by stored filename and owning context.
    async fn find_root_by_filename(
        &self,
        filename: &str,
        context: &ContextRef,
    ) -> Result<Option<Attachment>>;

    /// Insert a new attachment row.
    async fn insert(&self, req: NewAttachment) -> Result<Attachment>;

    /// Save every mutable field of an existing row.
    ///
    /// Fails with `Error::Validation` when the row is rejected.
    async fn update(&self, attachment: &Attachment) -> Result<()>;

    /// Compare-and-set the root pointer.
    ///
    /// Sets `root_attachment_id = new_root` only if it currently equals
    /// `expected`. Returns whether this caller won the transition.
    async fn claim_root(&self, id: Uuid, expected: Option<Uuid>, new_root: Uuid) -> Result<bool>;

    /// Re-point every child of `from` at `to`. Returns the number moved.
    async fn reparent_children(&self, from: Uuid, to: Uuid) -> Result<u64>;

    /// Number of attachments whose root is `id`.
    async fn count_children(&self, id: Uuid) -> Result<i64>;

    /// Mark the row deleted without removing it.
    async fn soft_delete(&self, id: Uuid) -> Result<StoreOutcome>;

    /// Remove the row.
    async fn hard_delete(&self, id: Uuid) -> Result<StoreOutcome>;
}

// =============================================================================
// CONTENT BYTES
// =============================================================================

/// Byte store keyed by the id of the attachment that owns the content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write the content for `id`, replacing anything already there.
    async fn write(&self, id: Uuid, data: &[u8]) -> Result<()>;

    /// Read the content for `id`.
    async fn read(&self, id: Uuid) -> Result<Vec<u8>>;

    /// Copy the content of `from` to `to`.
    async fn copy(&self, from: Uuid, to: Uuid) -> Result<StoreOutcome>;

    /// Delete the content for `id`.
    async fn delete(&self, id: Uuid) -> Result<StoreOutcome>;

    /// Delete the derived thumbnail for `id`.
    async fn delete_thumbnail(&self, id: Uuid) -> Result<StoreOutcome>;

    /// Check whether content exists for `id`.
    async fn exists(&self, id: Uuid) -> Result<bool>;
}

// =============================================================================
// ARTIFACT FAMILIES
// =============================================================================

/// Repository for generated artifact rows.
///
/// Listing methods return keyset pages ordered by id, for rows created
/// strictly before `cutoff`.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Content exports not already in the deleted state.
    async fn content_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ContentExport>>;

    async fn get_content_export(&self, id: Uuid) -> Result<Option<ContentExport>>;

    /// Every content export generated for a migration, ordered by id.
    async fn content_exports_for_migration(
        &self,
        migration_id: Uuid,
    ) -> Result<Vec<ContentExport>>;

    /// Move a content export to the deleted state, keeping the row.
    async fn mark_content_export_deleted(&self, id: Uuid) -> Result<()>;

    async fn delete_content_export(&self, id: Uuid) -> Result<StoreOutcome>;

    async fn epub_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<EpubExport>>;

    async fn delete_epub_export(&self, id: Uuid) -> Result<StoreOutcome>;

    async fn content_migrations_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ContentMigration>>;

    async fn delete_content_migration(&self, id: Uuid) -> Result<StoreOutcome>;

    async fn sis_batches_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SisBatch>>;

    /// Fails with `ConstraintViolation` while an account still references the batch.
    async fn delete_sis_batch(&self, id: Uuid) -> Result<StoreOutcome>;

    /// Decrement an assignment's generated-download counter (not below zero).
    async fn decrement_submission_downloads(&self, assignment_id: Uuid) -> Result<()>;
}

// =============================================================================
// TERMS AND SCOPES
// =============================================================================

/// Resolves a term identifier into one canonical term.
#[async_trait]
pub trait TermResolver: Send + Sync {
    /// Fails with `Error::UnresolvedTerm` when no term matches.
    async fn resolve_term(&self, identifier: &TermIdentifier) -> Result<Term>;
}

/// Organisational lookups used to build candidate id lists.
#[async_trait]
pub trait ContextDirectory: Send + Sync {
    /// The default (site) account, owner of the placeholders.
    async fn default_account(&self) -> Result<ContextRef>;

    /// Groups belonging to any of the courses.
    async fn group_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>>;

    /// Assignments belonging to any of the courses.
    async fn assignment_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>>;

    /// Quiz submissions for quizzes belonging to any of the courses.
    async fn quiz_submission_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>>;

    /// Attachment ids recorded in every version of every submission to an
    /// assignment of the courses.
    async fn submission_history_attachment_ids(&self, course_ids: &[Uuid]) -> Result<Vec<Uuid>>;
}

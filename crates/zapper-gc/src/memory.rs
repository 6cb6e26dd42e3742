//! In-memory implementation of every storage collaborator.
//!
//! Used by the engine tests and for dry runs against a snapshot. Emulates the
//! foreign keys of the Postgres schema: hard-deleting a referenced row
//! reports `ConstraintViolation`, attachment references held by artifact
//! rows are cleared when the attachment goes away. Every content, thumbnail
//! and copy call is recorded for assertions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryStore::new());
//! let root = store.add_root(ContextRef::course(course_id), "cat.jpg", "image/jpeg", b"jpeg");
//! let stores = Stores::from_memory(store.clone());
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use zapper_core::{
    compute_content_hash, ArtifactRepository, Attachment, AttachmentFilter, AttachmentRepository,
    AttachmentState, ContentExport, ContentMigration, ContentStore, ContextDirectory, ContextKind,
    ContextRef, EpubExport, Error, ExportState, NewAttachment, Result, SisBatch, StoreOutcome, Term,
    TermIdentifier, TermResolver,
};

/// Record of calls that touch content bytes.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub content_deletes: Vec<Uuid>,
    pub thumbnail_deletes: Vec<Uuid>,
    pub content_copies: Vec<(Uuid, Uuid)>,
    pub content_writes: Vec<Uuid>,
}

#[derive(Default)]
struct State {
    attachments: BTreeMap<Uuid, Attachment>,
    content: HashMap<Uuid, Vec<u8>>,
    thumbnails: HashSet<Uuid>,
    content_exports: BTreeMap<Uuid, ContentExport>,
    epub_exports: BTreeMap<Uuid, EpubExport>,
    migrations: BTreeMap<Uuid, ContentMigration>,
    sis_batches: BTreeMap<Uuid, SisBatch>,
    /// account id -> referenced sis batch id
    account_batches: HashMap<Uuid, Uuid>,
    submission_downloads: HashMap<Uuid, i32>,
    terms: Vec<Term>,
    groups: Vec<(Uuid, Uuid)>,
    assignments: Vec<(Uuid, Uuid)>,
    quiz_submissions: Vec<(Uuid, Uuid)>,
    submission_versions: Vec<(Uuid, Vec<Uuid>)>,
    rejected_updates: HashSet<Uuid>,
    calls: CallLog,
}

/// Thread-safe in-memory store.
pub struct MemoryStore {
    default_account: Uuid,
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with a fresh default account.
    pub fn new() -> Self {
        Self {
            default_account: Uuid::now_v7(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn default_account_id(&self) -> Uuid {
        self.default_account
    }

    // ─── Seeding ────────────────────────────────────────────────────────────

    /// Insert a root attachment owning `data`.
    pub fn add_root(
        &self,
        context: ContextRef,
        display_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Attachment {
        let now = Utc::now();
        let att = Attachment {
            id: Uuid::now_v7(),
            context,
            root_attachment_id: None,
            filename: display_name.to_string(),
            display_name: display_name.to_string(),
            content_type: content_type.to_string(),
            content_hash: compute_content_hash(data),
            size_bytes: data.len() as i64,
            state: AttachmentState::Available,
            has_thumbnail: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let mut state = self.state();
        state.content.insert(att.id, data.to_vec());
        state.attachments.insert(att.id, att.clone());
        att
    }

    /// Insert a child sharing `root`'s bytes.
    pub fn add_child(&self, root: &Attachment, context: ContextRef, display_name: &str) -> Attachment {
        let now = Utc::now();
        let att = Attachment {
            id: Uuid::now_v7(),
            context,
            root_attachment_id: Some(root.id),
            filename: root.filename.clone(),
            display_name: display_name.to_string(),
            content_type: root.content_type.clone(),
            content_hash: root.content_hash.clone(),
            size_bytes: root.size_bytes,
            state: AttachmentState::Available,
            has_thumbnail: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.state().attachments.insert(att.id, att.clone());
        att
    }

    /// Apply `f` to a stored attachment and return the result.
    pub fn modify(&self, id: Uuid, f: impl FnOnce(&mut Attachment)) -> Option<Attachment> {
        let mut state = self.state();
        let att = state.attachments.get_mut(&id)?;
        f(att);
        let snapshot = att.clone();
        if snapshot.has_thumbnail {
            state.thumbnails.insert(id);
        }
        Some(snapshot)
    }

    pub fn add_content_export(&self, export: ContentExport) {
        self.state().content_exports.insert(export.id, export);
    }

    pub fn add_epub_export(&self, epub: EpubExport) {
        self.state().epub_exports.insert(epub.id, epub);
    }

    pub fn add_migration(&self, migration: ContentMigration) {
        self.state().migrations.insert(migration.id, migration);
    }

    pub fn add_sis_batch(&self, batch: SisBatch) {
        self.state().sis_batches.insert(batch.id, batch);
    }

    /// Make `account_id` reference `batch_id`, blocking the batch's deletion.
    pub fn reference_sis_batch(&self, account_id: Uuid, batch_id: Uuid) {
        self.state().account_batches.insert(account_id, batch_id);
    }

    pub fn set_submission_downloads(&self, assignment_id: Uuid, count: i32) {
        self.state()
            .submission_downloads
            .insert(assignment_id, count);
    }

    pub fn add_term(&self, term: Term) {
        self.state().terms.push(term);
    }

    pub fn add_group(&self, course_id: Uuid, group_id: Uuid) {
        self.state().groups.push((course_id, group_id));
    }

    pub fn add_assignment(&self, course_id: Uuid, assignment_id: Uuid) {
        self.state().assignments.push((course_id, assignment_id));
    }

    pub fn add_quiz_submission(&self, course_id: Uuid, quiz_submission_id: Uuid) {
        self.state()
            .quiz_submissions
            .push((course_id, quiz_submission_id));
    }

    pub fn add_submission_version(&self, course_id: Uuid, attachment_ids: Vec<Uuid>) {
        self.state()
            .submission_versions
            .push((course_id, attachment_ids));
    }

    /// Make every later `update` of `id` fail validation.
    pub fn reject_updates_for(&self, id: Uuid) {
        self.state().rejected_updates.insert(id);
    }

    // ─── Inspection ─────────────────────────────────────────────────────────

    pub fn attachment(&self, id: Uuid) -> Option<Attachment> {
        self.state().attachments.get(&id).cloned()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.state().attachments.values().cloned().collect()
    }

    pub fn children_of(&self, id: Uuid) -> Vec<Attachment> {
        self.state()
            .attachments
            .values()
            .filter(|a| a.root_attachment_id == Some(id))
            .cloned()
            .collect()
    }

    pub fn has_content(&self, id: Uuid) -> bool {
        self.state().content.contains_key(&id)
    }

    pub fn content_of(&self, id: Uuid) -> Option<Vec<u8>> {
        self.state().content.get(&id).cloned()
    }

    pub fn has_thumbnail(&self, id: Uuid) -> bool {
        self.state().thumbnails.contains(&id)
    }

    /// Drop the bytes of `id` without recording a call.
    pub fn lose_content(&self, id: Uuid) {
        self.state().content.remove(&id);
    }

    pub fn content_export(&self, id: Uuid) -> Option<ContentExport> {
        self.state().content_exports.get(&id).cloned()
    }

    pub fn epub_export(&self, id: Uuid) -> Option<EpubExport> {
        self.state().epub_exports.get(&id).cloned()
    }

    pub fn migration(&self, id: Uuid) -> Option<ContentMigration> {
        self.state().migrations.get(&id).cloned()
    }

    pub fn sis_batch(&self, id: Uuid) -> Option<SisBatch> {
        self.state().sis_batches.get(&id).cloned()
    }

    pub fn submission_downloads(&self, assignment_id: Uuid) -> Option<i32> {
        self.state()
            .submission_downloads
            .get(&assignment_id)
            .copied()
    }

    pub fn calls(&self) -> CallLog {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls = CallLog::default();
    }
}

fn page<T: Clone>(
    rows: &BTreeMap<Uuid, T>,
    after: Option<Uuid>,
    limit: i64,
    keep: impl Fn(&T) -> bool,
) -> Vec<T> {
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.iter()
        .filter(|(id, _)| after.map_or(true, |a| **id > a))
        .map(|(_, row)| row)
        .filter(|row| keep(row))
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl AttachmentRepository for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Attachment>> {
        Ok(self.state().attachments.get(&id).cloned())
    }

    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.attachments.get(id).cloned())
            .collect())
    }

    async fn find_page(
        &self,
        filter: &AttachmentFilter,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Attachment>> {
        Ok(page(&self.state().attachments, after, limit, |a| {
            filter.matches(a)
        }))
    }

    async fn find_root_by_filename(
        &self,
        filename: &str,
        context: &ContextRef,
    ) -> Result<Option<Attachment>> {
        Ok(self
            .state()
            .attachments
            .values()
            .find(|a| a.is_root() && a.filename == filename && &a.context == context)
            .cloned())
    }

    async fn insert(&self, req: NewAttachment) -> Result<Attachment> {
        let now = Utc::now();
        let att = Attachment {
            id: req.id,
            context: req.context,
            root_attachment_id: req.root_attachment_id,
            filename: req.filename,
            display_name: req.display_name,
            content_type: req.content_type,
            content_hash: req.content_hash,
            size_bytes: req.size_bytes,
            state: req.state,
            has_thumbnail: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        att.validate()?;
        let mut state = self.state();
        if state.attachments.contains_key(&att.id) {
            return Err(Error::Validation(format!("attachment {} already exists", att.id)));
        }
        state.attachments.insert(att.id, att.clone());
        Ok(att)
    }

    async fn update(&self, attachment: &Attachment) -> Result<()> {
        attachment.validate()?;
        let mut state = self.state();
        if state.rejected_updates.contains(&attachment.id) {
            return Err(Error::Validation(format!(
                "attachment {} rejected by store",
                attachment.id
            )));
        }
        if let Some(root) = attachment.root_attachment_id {
            if !state.attachments.contains_key(&root) {
                return Err(Error::Validation(format!(
                    "root attachment {} does not exist",
                    root
                )));
            }
        }
        let stored = state
            .attachments
            .get_mut(&attachment.id)
            .ok_or(Error::AttachmentNotFound(attachment.id))?;
        *stored = attachment.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_root(&self, id: Uuid, expected: Option<Uuid>, new_root: Uuid) -> Result<bool> {
        let mut state = self.state();
        match state.attachments.get_mut(&id) {
            Some(att) if att.root_attachment_id == expected => {
                att.root_attachment_id = Some(new_root);
                att.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reparent_children(&self, from: Uuid, to: Uuid) -> Result<u64> {
        let mut moved = 0;
        for att in self.state().attachments.values_mut() {
            if att.root_attachment_id == Some(from) && att.id != to {
                att.root_attachment_id = Some(to);
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn count_children(&self, id: Uuid) -> Result<i64> {
        Ok(self
            .state()
            .attachments
            .values()
            .filter(|a| a.root_attachment_id == Some(id))
            .count() as i64)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        match state.attachments.get_mut(&id) {
            Some(att) => {
                att.state = AttachmentState::Deleted;
                att.deleted_at = Some(Utc::now());
                Ok(StoreOutcome::Done)
            }
            None => Ok(StoreOutcome::NotFound),
        }
    }

    async fn hard_delete(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        if !state.attachments.contains_key(&id) {
            return Ok(StoreOutcome::NotFound);
        }
        if state
            .attachments
            .values()
            .any(|a| a.root_attachment_id == Some(id))
        {
            return Ok(StoreOutcome::ConstraintViolation(format!(
                "attachment {} is still a root",
                id
            )));
        }
        state.attachments.remove(&id);
        for export in state.content_exports.values_mut() {
            if export.attachment_id == Some(id) {
                export.attachment_id = None;
            }
        }
        for migration in state.migrations.values_mut() {
            for slot in [
                &mut migration.attachment_id,
                &mut migration.overview_attachment_id,
                &mut migration.exported_attachment_id,
            ] {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }
        Ok(StoreOutcome::Done)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn write(&self, id: Uuid, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.calls.content_writes.push(id);
        state.content.insert(id, data.to_vec());
        Ok(())
    }

    async fn read(&self, id: Uuid) -> Result<Vec<u8>> {
        self.state()
            .content
            .get(&id)
            .cloned()
            .ok_or(Error::ContentNotFound(id))
    }

    async fn copy(&self, from: Uuid, to: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        state.calls.content_copies.push((from, to));
        match state.content.get(&from).cloned() {
            Some(data) => {
                state.content.insert(to, data);
                Ok(StoreOutcome::Done)
            }
            None => Ok(StoreOutcome::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        state.calls.content_deletes.push(id);
        Ok(match state.content.remove(&id) {
            Some(_) => StoreOutcome::Done,
            None => StoreOutcome::NotFound,
        })
    }

    async fn delete_thumbnail(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        state.calls.thumbnail_deletes.push(id);
        Ok(if state.thumbnails.remove(&id) {
            StoreOutcome::Done
        } else {
            StoreOutcome::NotFound
        })
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.state().content.contains_key(&id))
    }
}

#[async_trait]
impl ArtifactRepository for MemoryStore {
    async fn content_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ContentExport>> {
        Ok(page(&self.state().content_exports, after, limit, |e| {
            e.created_at < cutoff && e.workflow_state != ExportState::Deleted
        }))
    }

    async fn get_content_export(&self, id: Uuid) -> Result<Option<ContentExport>> {
        Ok(self.state().content_exports.get(&id).cloned())
    }

    async fn content_exports_for_migration(
        &self,
        migration_id: Uuid,
    ) -> Result<Vec<ContentExport>> {
        let mut exports: Vec<ContentExport> = self
            .state()
            .content_exports
            .values()
            .filter(|e| e.content_migration_id == Some(migration_id))
            .cloned()
            .collect();
        exports.sort_by_key(|e| e.id);
        Ok(exports)
    }

    async fn mark_content_export_deleted(&self, id: Uuid) -> Result<()> {
        let mut state = self.state();
        let export = state
            .content_exports
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("content export {}", id)))?;
        export.workflow_state = ExportState::Deleted;
        Ok(())
    }

    async fn delete_content_export(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        if !state.content_exports.contains_key(&id) {
            return Ok(StoreOutcome::NotFound);
        }
        if state
            .epub_exports
            .values()
            .any(|e| e.content_export_id == Some(id))
        {
            return Ok(StoreOutcome::ConstraintViolation(format!(
                "content export {} is referenced by an epub export",
                id
            )));
        }
        state.content_exports.remove(&id);
        Ok(StoreOutcome::Done)
    }

    async fn epub_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<EpubExport>> {
        Ok(page(&self.state().epub_exports, after, limit, |e| {
            e.created_at < cutoff
        }))
    }

    async fn delete_epub_export(&self, id: Uuid) -> Result<StoreOutcome> {
        Ok(match self.state().epub_exports.remove(&id) {
            Some(_) => StoreOutcome::Done,
            None => StoreOutcome::NotFound,
        })
    }

    async fn content_migrations_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ContentMigration>> {
        Ok(page(&self.state().migrations, after, limit, |m| {
            m.created_at < cutoff
        }))
    }

    async fn delete_content_migration(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        if !state.migrations.contains_key(&id) {
            return Ok(StoreOutcome::NotFound);
        }
        if state
            .content_exports
            .values()
            .any(|e| e.content_migration_id == Some(id))
        {
            return Ok(StoreOutcome::ConstraintViolation(format!(
                "content migration {} is referenced by a content export",
                id
            )));
        }
        state.migrations.remove(&id);
        Ok(StoreOutcome::Done)
    }

    async fn sis_batches_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SisBatch>> {
        Ok(page(&self.state().sis_batches, after, limit, |b| {
            b.created_at < cutoff
        }))
    }

    async fn delete_sis_batch(&self, id: Uuid) -> Result<StoreOutcome> {
        let mut state = self.state();
        if !state.sis_batches.contains_key(&id) {
            return Ok(StoreOutcome::NotFound);
        }
        if state.account_batches.values().any(|b| *b == id) {
            return Ok(StoreOutcome::ConstraintViolation(format!(
                "sis batch {} is referenced by an account",
                id
            )));
        }
        state.sis_batches.remove(&id);
        Ok(StoreOutcome::Done)
    }

    async fn decrement_submission_downloads(&self, assignment_id: Uuid) -> Result<()> {
        let mut state = self.state();
        let count = state.submission_downloads.entry(assignment_id).or_insert(0);
        *count = (*count - 1).max(0);
        Ok(())
    }
}

#[async_trait]
impl TermResolver for MemoryStore {
    async fn resolve_term(&self, identifier: &TermIdentifier) -> Result<Term> {
        let state = self.state();
        let found = state.terms.iter().find(|t| match identifier {
            TermIdentifier::Id(id) => t.id == *id,
            TermIdentifier::SisSourceId(sis) => t.sis_source_id.as_deref() == Some(sis.as_str()),
        });
        found
            .cloned()
            .ok_or_else(|| Error::UnresolvedTerm(identifier.to_string()))
    }
}

fn contexts_for(
    pairs: &[(Uuid, Uuid)],
    course_ids: &[Uuid],
    kind: ContextKind,
) -> Vec<ContextRef> {
    pairs
        .iter()
        .filter(|(course, _)| course_ids.contains(course))
        .map(|(_, id)| ContextRef::new(kind, *id))
        .collect()
}

#[async_trait]
impl ContextDirectory for MemoryStore {
    async fn default_account(&self) -> Result<ContextRef> {
        Ok(ContextRef::account(self.default_account))
    }

    async fn group_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>> {
        Ok(contexts_for(&self.state().groups, course_ids, ContextKind::Group))
    }

    async fn assignment_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>> {
        Ok(contexts_for(
            &self.state().assignments,
            course_ids,
            ContextKind::Assignment,
        ))
    }

    async fn quiz_submission_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>> {
        Ok(contexts_for(
            &self.state().quiz_submissions,
            course_ids,
            ContextKind::QuizSubmission,
        ))
    }

    async fn submission_history_attachment_ids(&self, course_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        Ok(self
            .state()
            .submission_versions
            .iter()
            .filter(|(course, _)| course_ids.contains(course))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect())
    }
}

/// Convenience: share one store as every collaborator.
pub fn shared() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

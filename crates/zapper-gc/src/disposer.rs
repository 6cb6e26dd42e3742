//! Retention sweeps over generated artifacts and soft-deleted files.
//!
//! Every sweep pages lazily through rows created (or deleted) strictly
//! before its cutoff. Rows are removed in dependency order: attachments
//! before the artifact that owns them, a migration's content export before
//! the migration. A missing file never aborts a sweep.

use std::time::Instant;

use futures::TryStreamExt;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use zapper_core::{
    defaults, logging, Attachment, AttachmentFilter, AttachmentState, ContentExport,
    ContentMigration, ContextKind, ContextRef, EpubExport, Error, ExportState, Result,
    RetentionPolicy, SisBatch, StoreOutcome,
};

use crate::lifecycle::{demote, purge_content};
use crate::paging::keyset_pages;
use crate::placeholder::PlaceholderKey;
use crate::report::{DisposalReport, SweepReport};
use crate::Stores;

/// Result of destroying one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destroyed {
    Removed,
    /// No such row.
    Missing,
    /// Placeholder root, left in place.
    Protected,
}

pub struct Disposer {
    stores: Stores,
    policy: RetentionPolicy,
    page_size: i64,
    protected: Option<PlaceholderKey>,
}

impl Disposer {
    pub fn new(stores: Stores, policy: RetentionPolicy) -> Self {
        Self {
            stores,
            policy,
            page_size: defaults::SWEEP_PAGE_SIZE,
            protected: None,
        }
    }

    /// Never destroy the placeholder roots identified by `key`.
    pub fn protecting(mut self, key: PlaceholderKey) -> Self {
        self.protected = Some(key);
        self
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    // ─── Entry points ───────────────────────────────────────────────────────

    /// Purge soft-deleted attachments whose `deleted_at` is past the cutoff.
    pub async fn delete_deleted_files(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(logging::FAMILY_SOFT_DELETED);
        let outcome = self.soft_deleted_sweep(&mut report).await;
        finish(report, outcome, start)
    }

    /// Run every artifact sweep in order. Each sweep runs even if an
    /// earlier one failed.
    pub async fn delete_disposable_files(&self) -> DisposalReport {
        let start = Instant::now();
        let sweeps = vec![
            self.delete_content_exports().await,
            self.delete_submission_exports().await,
            self.delete_epub_exports().await,
            self.delete_content_migrations().await,
            self.delete_sis_batches().await,
        ];
        let report = DisposalReport { sweeps };
        info!(
            subsystem = logging::DISPOSER,
            op = "dispose",
            total = report.total(),
            has_errors = report.has_errors(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Disposal run complete"
        );
        report
    }

    /// Destroy each old content export's attachment and mark it deleted.
    pub async fn delete_content_exports(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(logging::FAMILY_CONTENT_EXPORT);
        let outcome = self.content_exports_sweep(&mut report).await;
        finish(report, outcome, start)
    }

    /// Destroy old "download all submissions" archives.
    pub async fn delete_submission_exports(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(logging::FAMILY_SUBMISSION_EXPORT);
        let outcome = self.submission_exports_sweep(&mut report).await;
        finish(report, outcome, start)
    }

    /// Destroy old ePub exports together with their content export.
    pub async fn delete_epub_exports(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(logging::FAMILY_EPUB_EXPORT);
        let outcome = self.epub_exports_sweep(&mut report).await;
        finish(report, outcome, start)
    }

    /// Destroy old content migrations, their export and every attachment.
    pub async fn delete_content_migrations(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(logging::FAMILY_CONTENT_MIGRATION);
        let outcome = self.content_migrations_sweep(&mut report).await;
        finish(report, outcome, start)
    }

    /// Destroy old SIS batches' attachments, then the batches themselves.
    ///
    /// A batch still referenced by an account is retained and counted.
    pub async fn delete_sis_batches(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(logging::FAMILY_SIS_BATCH);
        let outcome = self.sis_batches_sweep(&mut report).await;
        finish(report, outcome, start)
    }

    // ─── Shared primitive ───────────────────────────────────────────────────

    /// Remove one attachment row, and its bytes if it owns them.
    ///
    /// The row is re-read first. A root with children is demoted so the
    /// children keep their content.
    pub async fn destroy_attachment(&self, id: Uuid) -> Result<Destroyed> {
        let Some(att) = self.stores.attachments.get(id).await? else {
            return Ok(Destroyed::Missing);
        };

        if att.is_root() {
            if self.protected.as_ref().is_some_and(|key| key.matches(&att)) {
                warn!(
                    subsystem = logging::DISPOSER,
                    op = "destroy",
                    attachment_id = %att.id,
                    "Refusing to destroy placeholder"
                );
                return Ok(Destroyed::Protected);
            }
            demote(&self.stores, &att).await?;
            purge_content(&self.stores, &att).await?;
        }

        match self.stores.attachments.hard_delete(att.id).await? {
            StoreOutcome::Done => {
                debug!(
                    subsystem = logging::DISPOSER,
                    op = "destroy",
                    attachment_id = %att.id,
                    root = att.is_root(),
                    "Attachment destroyed"
                );
                Ok(Destroyed::Removed)
            }
            StoreOutcome::NotFound => Ok(Destroyed::Missing),
            StoreOutcome::ConstraintViolation(detail) => Err(Error::ForeignKeyViolation(format!(
                "attachment {}: {}",
                att.id, detail
            ))),
        }
    }

    /// Destroy a content export's attachment and move it to the deleted state.
    async fn dispose_content_export(
        &self,
        export: &ContentExport,
        report: &mut SweepReport,
    ) -> Result<()> {
        if let Some(attachment_id) = export.attachment_id {
            self.destroy_counted(attachment_id, report).await?;
        }
        if export.workflow_state != ExportState::Deleted {
            self.stores
                .artifacts
                .mark_content_export_deleted(export.id)
                .await?;
            report.artifacts_removed += 1;
        }
        Ok(())
    }

    // ─── Sweeps ─────────────────────────────────────────────────────────────

    async fn soft_deleted_sweep(&self, report: &mut SweepReport) -> Result<()> {
        let filter = AttachmentFilter::new()
            .with_state(AttachmentState::Deleted)
            .deleted_before(self.policy.cutoff_soft_deleted);
        let mut pages = self.attachment_pages(filter);
        while let Some(page) = pages.try_next().await? {
            trace!(subsystem = logging::DISPOSER, rows = page.len(), "Soft-deleted page");
            self.destroy_all(page, report).await?;
        }
        Ok(())
    }

    async fn content_exports_sweep(&self, report: &mut SweepReport) -> Result<()> {
        let artifacts = self.stores.artifacts.clone();
        let cutoff = self.policy.cutoff_exports;
        let limit = self.page_size;
        let mut pages = keyset_pages(limit, move |after| {
            let artifacts = artifacts.clone();
            async move { artifacts.content_exports_before(cutoff, after, limit).await }
        });
        while let Some(page) = pages.try_next().await? {
            for export in page {
                self.dispose_content_export(&export, report).await?;
            }
        }
        Ok(())
    }

    async fn submission_exports_sweep(&self, report: &mut SweepReport) -> Result<()> {
        let filter = AttachmentFilter::new()
            .of_kind(ContextKind::Assignment)
            .with_state(AttachmentState::Zipped)
            .named(defaults::SUBMISSIONS_EXPORT_NAME)
            .created_before(self.policy.cutoff_exports);
        let mut pages = self.attachment_pages(filter);
        while let Some(page) = pages.try_next().await? {
            for att in page {
                self.stores
                    .artifacts
                    .decrement_submission_downloads(att.context.id)
                    .await?;
                self.destroy_counted(att.id, report).await?;
            }
        }
        Ok(())
    }

    async fn epub_exports_sweep(&self, report: &mut SweepReport) -> Result<()> {
        let artifacts = self.stores.artifacts.clone();
        let cutoff = self.policy.cutoff_epubs;
        let limit = self.page_size;
        let mut pages = keyset_pages(limit, move |after| {
            let artifacts = artifacts.clone();
            async move { artifacts.epub_exports_before(cutoff, after, limit).await }
        });
        while let Some(page) = pages.try_next().await? {
            for epub in page {
                self.dispose_epub(&epub, report).await?;
            }
        }
        Ok(())
    }

    async fn dispose_epub(&self, epub: &EpubExport, report: &mut SweepReport) -> Result<()> {
        self.destroy_context(ContextRef::epub_export(epub.id), report)
            .await?;

        if let Some(export_id) = epub.content_export_id {
            if let Some(export) = self.stores.artifacts.get_content_export(export_id).await? {
                self.dispose_content_export(&export, report).await?;
            }
        }

        match self.stores.artifacts.delete_epub_export(epub.id).await? {
            StoreOutcome::Done => report.artifacts_removed += 1,
            StoreOutcome::NotFound => {}
            StoreOutcome::ConstraintViolation(detail) => {
                return Err(Error::ForeignKeyViolation(format!(
                    "epub export {}: {}",
                    epub.id, detail
                )))
            }
        }
        debug!(
            subsystem = logging::DISPOSER,
            op = "epub",
            artifact_id = %epub.id,
            "ePub export disposed"
        );
        Ok(())
    }

    async fn content_migrations_sweep(&self, report: &mut SweepReport) -> Result<()> {
        let artifacts = self.stores.artifacts.clone();
        let cutoff = self.policy.cutoff_exports;
        let limit = self.page_size;
        let mut pages = keyset_pages(limit, move |after| {
            let artifacts = artifacts.clone();
            async move { artifacts.content_migrations_before(cutoff, after, limit).await }
        });
        while let Some(page) = pages.try_next().await? {
            for migration in page {
                self.dispose_migration(&migration, report).await?;
            }
        }
        Ok(())
    }

    async fn dispose_migration(
        &self,
        migration: &ContentMigration,
        report: &mut SweepReport,
    ) -> Result<()> {
        let artifacts = &self.stores.artifacts;

        // Export rows reference the migration, so they go first.
        for export in artifacts.content_exports_for_migration(migration.id).await? {
            match artifacts.delete_content_export(export.id).await? {
                StoreOutcome::Done => report.artifacts_removed += 1,
                StoreOutcome::NotFound => {}
                StoreOutcome::ConstraintViolation(detail) => {
                    return Err(Error::ForeignKeyViolation(format!(
                        "content export {} of migration {}: {}",
                        export.id, migration.id, detail
                    )))
                }
            }
            if let Some(attachment_id) = export.attachment_id {
                self.destroy_counted(attachment_id, report).await?;
            }
        }

        for attachment_id in migration.attachment_ids() {
            self.destroy_counted(attachment_id, report).await?;
        }

        match artifacts.delete_content_migration(migration.id).await? {
            StoreOutcome::Done => report.artifacts_removed += 1,
            StoreOutcome::NotFound => {}
            StoreOutcome::ConstraintViolation(detail) => {
                return Err(Error::ForeignKeyViolation(format!(
                    "content migration {}: {}",
                    migration.id, detail
                )))
            }
        }
        Ok(())
    }

    async fn sis_batches_sweep(&self, report: &mut SweepReport) -> Result<()> {
        let artifacts = self.stores.artifacts.clone();
        let cutoff = self.policy.cutoff_sis_imports;
        let limit = self.page_size;
        let mut pages = keyset_pages(limit, move |after| {
            let artifacts = artifacts.clone();
            async move { artifacts.sis_batches_before(cutoff, after, limit).await }
        });
        while let Some(page) = pages.try_next().await? {
            for batch in page {
                self.dispose_sis_batch(&batch, report).await?;
            }
        }
        Ok(())
    }

    async fn dispose_sis_batch(&self, batch: &SisBatch, report: &mut SweepReport) -> Result<()> {
        self.destroy_context(ContextRef::sis_batch(batch.id), report)
            .await?;

        match self.stores.artifacts.delete_sis_batch(batch.id).await? {
            StoreOutcome::Done => report.artifacts_removed += 1,
            StoreOutcome::NotFound => {}
            StoreOutcome::ConstraintViolation(detail) => {
                warn!(
                    subsystem = logging::DISPOSER,
                    op = "sis_batch",
                    artifact_id = %batch.id,
                    account_id = %batch.account_id,
                    detail = %detail,
                    "SIS batch still referenced, retained"
                );
                report.retained += 1;
            }
        }
        Ok(())
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    fn attachment_pages(
        &self,
        filter: AttachmentFilter,
    ) -> futures::stream::BoxStream<'static, Result<Vec<Attachment>>> {
        let attachments = self.stores.attachments.clone();
        let limit = self.page_size;
        keyset_pages(limit, move |after| {
            let attachments = attachments.clone();
            let filter = filter.clone();
            async move { attachments.find_page(&filter, after, limit).await }
        })
    }

    /// Destroy every attachment owned by `context`.
    ///
    /// The listing is taken up front: holders created while destroying
    /// share the context and must not be revisited. Holders left by earlier
    /// runs stay while they still have children; once childless they go too.
    async fn destroy_context(&self, context: ContextRef, report: &mut SweepReport) -> Result<()> {
        let filter = AttachmentFilter::new().in_contexts(vec![context]);
        let mut owned: Vec<Attachment> = self.attachment_pages(filter).try_concat().await?;
        owned.sort_by_key(Attachment::is_root);

        for att in owned {
            if att.state == AttachmentState::Hidden
                && att.is_root()
                && self.stores.attachments.count_children(att.id).await? > 0
            {
                trace!(
                    subsystem = logging::DISPOSER,
                    op = "destroy",
                    attachment_id = %att.id,
                    context = %context,
                    "Holder still in use, kept"
                );
                continue;
            }
            self.destroy_counted(att.id, report).await?;
        }
        Ok(())
    }

    /// Destroy `batch`, children before roots.
    async fn destroy_all(&self, mut batch: Vec<Attachment>, report: &mut SweepReport) -> Result<()> {
        batch.sort_by_key(Attachment::is_root);
        for att in batch {
            self.destroy_counted(att.id, report).await?;
        }
        Ok(())
    }

    /// Destroy one attachment, recording the result. Record-scoped errors
    /// are counted; anything else aborts the sweep.
    async fn destroy_counted(&self, id: Uuid, report: &mut SweepReport) -> Result<()> {
        match self.destroy_attachment(id).await {
            Ok(Destroyed::Removed) => report.destroyed += 1,
            Ok(Destroyed::Protected) => report.skipped += 1,
            Ok(Destroyed::Missing) => {}
            Err(e) if e.is_record_scoped() => {
                warn!(
                    subsystem = logging::DISPOSER,
                    op = "destroy",
                    attachment_id = %id,
                    error = %e,
                    "Attachment skipped"
                );
                report.errors.push(format!("attachment {}: {}", id, e));
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

fn finish(mut report: SweepReport, outcome: Result<()>, start: Instant) -> SweepReport {
    if let Err(e) = outcome {
        error!(
            subsystem = logging::DISPOSER,
            op = "sweep",
            family = report.family,
            error = %e,
            "Sweep aborted"
        );
        report.errors.push(e.to_string());
    }
    info!(
        subsystem = logging::DISPOSER,
        op = "sweep",
        family = report.family,
        destroyed = report.destroyed,
        artifacts_removed = report.artifacts_removed,
        retained = report.retained,
        skipped = report.skipped,
        errors = report.errors.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Sweep complete"
    );
    report
}

//! Retention sweeps against the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use zapper_core::{
    logging, Attachment, AttachmentState, ContentExport, ContentMigration, ContextKind, ContextRef,
    EpubExport, ExportState, RetentionPolicy, SisBatch,
};
use zapper_gc::{Destroyed, Disposer, MemoryStore, PlaceholderKey, Stores};

fn long_ago() -> DateTime<Utc> {
    Utc::now() - Duration::days(1000)
}

fn disposer(store: &Arc<MemoryStore>) -> Disposer {
    let key = PlaceholderKey::new(
        ContextRef::account(store.default_account_id()),
        "file_removed",
    );
    Disposer::new(
        Stores::from_memory(store.clone()),
        RetentionPolicy::relative_to(Utc::now()),
    )
    .protecting(key)
    .with_page_size(2)
}

fn old_root(store: &MemoryStore, ctx: ContextRef, name: &str) -> Attachment {
    let att = store.add_root(ctx, name, "application/pdf", name.as_bytes());
    store
        .modify(att.id, |a| a.created_at = long_ago())
        .unwrap_or(att)
}

fn content_export(store: &MemoryStore, attachment_id: Option<Uuid>, migration: Option<Uuid>) -> ContentExport {
    let export = ContentExport {
        id: Uuid::now_v7(),
        context: ContextRef::course(Uuid::now_v7()),
        attachment_id,
        content_migration_id: migration,
        workflow_state: ExportState::Exported,
        created_at: long_ago(),
    };
    store.add_content_export(export.clone());
    export
}

#[tokio::test]
async fn test_soft_deleted_files_past_cutoff_are_purged() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ContextRef::course(Uuid::now_v7());
    let old = store.add_root(ctx, "old.pdf", "application/pdf", b"old");
    let recent = store.add_root(ctx, "recent.pdf", "application/pdf", b"recent");
    let live = store.add_root(ctx, "live.pdf", "application/pdf", b"live");
    let child = store.add_child(&old, ctx, "still used.pdf");
    store.modify(old.id, |a| {
        a.state = AttachmentState::Deleted;
        a.deleted_at = Some(long_ago());
        a.has_thumbnail = true;
    });
    store.modify(recent.id, |a| {
        a.state = AttachmentState::Deleted;
        a.deleted_at = Some(Utc::now());
    });

    let report = disposer(&store).delete_deleted_files().await;

    assert_eq!(report.family, logging::FAMILY_SOFT_DELETED);
    assert_eq!(report.destroyed, 1);
    assert!(report.errors.is_empty());
    assert!(store.attachment(old.id).is_none());
    assert!(!store.has_content(old.id));
    assert!(!store.has_thumbnail(old.id));
    assert!(store.attachment(recent.id).is_some());
    assert!(store.has_content(live.id));

    // The child keeps its bytes through a hidden holder.
    let holder = store.attachment(child.id).unwrap().root_attachment_id.unwrap();
    assert_eq!(store.attachment(holder).unwrap().state, AttachmentState::Hidden);
    assert_eq!(store.content_of(holder).unwrap(), b"old");
    assert_eq!(store.calls().content_deletes, vec![old.id]);
}

#[tokio::test]
async fn test_missing_bytes_do_not_abort_a_sweep() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ContextRef::course(Uuid::now_v7());
    let ids: Vec<Uuid> = (0..3)
        .map(|i| {
            let att = store.add_root(ctx, &format!("{}.pdf", i), "application/pdf", b"x");
            store.modify(att.id, |a| {
                a.state = AttachmentState::Deleted;
                a.deleted_at = Some(long_ago());
            });
            att.id
        })
        .collect();
    store.lose_content(ids[1]);

    let report = disposer(&store).delete_deleted_files().await;

    assert_eq!(report.destroyed, 3);
    assert!(report.errors.is_empty());
    assert!(ids.iter().all(|id| store.attachment(*id).is_none()));
}

#[tokio::test]
async fn test_placeholder_is_never_destroyed() {
    let store = Arc::new(MemoryStore::new());
    let owner = ContextRef::account(store.default_account_id());
    let placeholder = store.add_root(owner, "file_removed.png", "image/png", b"png");
    store.modify(placeholder.id, |a| {
        a.state = AttachmentState::Deleted;
        a.deleted_at = Some(long_ago());
    });

    let d = disposer(&store);
    let report = d.delete_deleted_files().await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.destroyed, 0);
    assert!(store.attachment(placeholder.id).is_some());
    assert!(store.has_content(placeholder.id));
    assert_eq!(
        d.destroy_attachment(placeholder.id).await.unwrap(),
        Destroyed::Protected
    );
}

#[tokio::test]
async fn test_destroying_a_child_leaves_root_bytes() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ContextRef::course(Uuid::now_v7());
    let root = store.add_root(ctx, "a.pdf", "application/pdf", b"a");
    let child = store.add_child(&root, ctx, "b.pdf");

    let d = disposer(&store);
    assert_eq!(d.destroy_attachment(child.id).await.unwrap(), Destroyed::Removed);
    assert_eq!(d.destroy_attachment(child.id).await.unwrap(), Destroyed::Missing);

    assert!(store.has_content(root.id));
    assert!(store.calls().content_deletes.is_empty());
}

#[tokio::test]
async fn test_content_exports_are_marked_deleted() {
    let store = Arc::new(MemoryStore::new());
    let export_id = Uuid::now_v7();
    let att = old_root(&store, ContextRef::new(ContextKind::ContentExport, export_id), "export.imscc");
    let export = ContentExport {
        id: export_id,
        context: ContextRef::course(Uuid::now_v7()),
        attachment_id: Some(att.id),
        content_migration_id: None,
        workflow_state: ExportState::Exported,
        created_at: long_ago(),
    };
    store.add_content_export(export);
    let recent = ContentExport {
        id: Uuid::now_v7(),
        context: ContextRef::course(Uuid::now_v7()),
        attachment_id: None,
        content_migration_id: None,
        workflow_state: ExportState::Exported,
        created_at: Utc::now(),
    };
    store.add_content_export(recent.clone());

    let d = disposer(&store);
    let report = d.delete_content_exports().await;

    assert_eq!(report.destroyed, 1);
    assert_eq!(report.artifacts_removed, 1);
    let row = store.content_export(export_id).unwrap();
    assert_eq!(row.workflow_state, ExportState::Deleted);
    assert_eq!(row.attachment_id, None);
    assert!(store.attachment(att.id).is_none());
    assert_eq!(
        store.content_export(recent.id).unwrap().workflow_state,
        ExportState::Exported
    );

    // Deleted exports are not listed again.
    let again = d.delete_content_exports().await;
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn test_submission_exports_decrement_downloads() {
    let store = Arc::new(MemoryStore::new());
    let assignment = Uuid::now_v7();
    let ctx = ContextRef::assignment(assignment);
    store.set_submission_downloads(assignment, 2);

    let zip = store.add_root(ctx, "submissions.zip", "application/zip", b"zip");
    store.modify(zip.id, |a| {
        a.state = AttachmentState::Zipped;
        a.created_at = long_ago();
    });
    let fresh = store.add_root(ctx, "submissions.zip", "application/zip", b"zip2");
    store.modify(fresh.id, |a| a.state = AttachmentState::Zipped);
    let comment = old_root(&store, ctx, "feedback.pdf");

    let report = disposer(&store).delete_submission_exports().await;

    assert_eq!(report.destroyed, 1);
    assert_eq!(store.submission_downloads(assignment), Some(1));
    assert!(store.attachment(zip.id).is_none());
    assert!(store.attachment(fresh.id).is_some());
    assert!(store.attachment(comment.id).is_some());
}

#[tokio::test]
async fn test_epub_export_past_cutoff() {
    let store = Arc::new(MemoryStore::new());
    let epub_id = Uuid::now_v7();
    let export_att = old_root(&store, ContextRef::course(Uuid::now_v7()), "course.imscc");
    let export = content_export(&store, Some(export_att.id), None);
    let epub_ctx = ContextRef::epub_export(epub_id);
    let book = old_root(&store, epub_ctx, "course.epub");
    let zip = old_root(&store, epub_ctx, "course.zip");
    store.add_epub_export(EpubExport {
        id: epub_id,
        course_id: Uuid::now_v7(),
        content_export_id: Some(export.id),
        workflow_state: "generated".into(),
        created_at: long_ago(),
    });

    let report = disposer(&store).delete_epub_exports().await;

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.destroyed, 3);
    for id in [book.id, zip.id, export_att.id] {
        assert!(store.attachment(id).is_none());
        assert!(!store.has_content(id));
    }
    assert_eq!(
        store.content_export(export.id).unwrap().workflow_state,
        ExportState::Deleted
    );
    assert!(store.epub_export(epub_id).is_none());
}

#[tokio::test]
async fn test_epub_attachment_shared_elsewhere_keeps_bytes() {
    let store = Arc::new(MemoryStore::new());
    let epub_id = Uuid::now_v7();
    let book = old_root(&store, ContextRef::epub_export(epub_id), "course.epub");
    let copy = store.add_child(&book, ContextRef::course(Uuid::now_v7()), "course.epub");
    store.add_epub_export(EpubExport {
        id: epub_id,
        course_id: Uuid::now_v7(),
        content_export_id: None,
        workflow_state: "generated".into(),
        created_at: long_ago(),
    });

    let report = disposer(&store).delete_epub_exports().await;

    assert!(report.errors.is_empty());
    assert!(store.attachment(book.id).is_none());
    let holder = store.attachment(copy.id).unwrap().root_attachment_id.unwrap();
    assert_eq!(store.content_of(holder).unwrap(), b"course.epub");
}

#[tokio::test]
async fn test_migration_export_goes_before_migration() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ContextRef::course(Uuid::now_v7());
    let upload = old_root(&store, ctx, "upload.zip");
    let overview = old_root(&store, ctx, "overview.json");
    let exported = old_root(&store, ctx, "exported.imscc");
    let migration = ContentMigration {
        id: Uuid::now_v7(),
        context: ctx,
        attachment_id: Some(upload.id),
        overview_attachment_id: Some(overview.id),
        exported_attachment_id: Some(exported.id),
        workflow_state: "imported".into(),
        created_at: long_ago(),
    };
    store.add_migration(migration.clone());
    let export_att = old_root(&store, ctx, "copy.imscc");
    let export = content_export(&store, Some(export_att.id), Some(migration.id));

    let report = disposer(&store).delete_content_migrations().await;

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.destroyed, 4);
    assert_eq!(report.artifacts_removed, 2);
    assert!(store.content_export(export.id).is_none());
    assert!(store.migration(migration.id).is_none());
    for id in [upload.id, overview.id, exported.id, export_att.id] {
        assert!(store.attachment(id).is_none());
    }
}

#[tokio::test]
async fn test_referenced_migration_export_aborts_only_its_sweep() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ContextRef::course(Uuid::now_v7());
    let migration = ContentMigration {
        id: Uuid::now_v7(),
        context: ctx,
        attachment_id: None,
        overview_attachment_id: None,
        exported_attachment_id: None,
        workflow_state: "imported".into(),
        created_at: long_ago(),
    };
    store.add_migration(migration.clone());
    let export = content_export(&store, None, Some(migration.id));
    // A recent epub still points at the export.
    store.add_epub_export(EpubExport {
        id: Uuid::now_v7(),
        course_id: Uuid::now_v7(),
        content_export_id: Some(export.id),
        workflow_state: "generated".into(),
        created_at: Utc::now(),
    });

    let batch = SisBatch {
        id: Uuid::now_v7(),
        account_id: store.default_account_id(),
        workflow_state: "imported".into(),
        created_at: long_ago(),
    };
    store.add_sis_batch(batch.clone());

    let report = disposer(&store).delete_disposable_files().await;

    let migrations = report.sweep(logging::FAMILY_CONTENT_MIGRATION).unwrap();
    assert_eq!(migrations.errors.len(), 1);
    assert!(migrations.errors[0].contains("Foreign key violation"));
    assert!(store.migration(migration.id).is_some());

    let sis = report.sweep(logging::FAMILY_SIS_BATCH).unwrap();
    assert!(sis.errors.is_empty());
    assert!(store.sis_batch(batch.id).is_none());
    assert!(report.has_errors());
}

#[tokio::test]
async fn test_referenced_sis_batch_is_retained() {
    let store = Arc::new(MemoryStore::new());
    let account = store.default_account_id();
    let batch = SisBatch {
        id: Uuid::now_v7(),
        account_id: account,
        workflow_state: "imported".into(),
        created_at: long_ago(),
    };
    store.add_sis_batch(batch.clone());
    store.reference_sis_batch(account, batch.id);

    let ctx = ContextRef::sis_batch(batch.id);
    let csv = old_root(&store, ctx, "users.csv");
    let errors = old_root(&store, ctx, "errors.csv");
    let bystander = old_root(&store, ContextRef::course(Uuid::now_v7()), "syllabus.pdf");

    let report = disposer(&store).delete_sis_batches().await;

    assert_eq!(report.destroyed, 2);
    assert_eq!(report.retained, 1);
    assert_eq!(report.artifacts_removed, 0);
    assert!(report.errors.is_empty());
    assert!(store.sis_batch(batch.id).is_some());
    assert!(store.attachment(csv.id).is_none());
    assert!(store.attachment(errors.id).is_none());
    assert!(store.has_content(bystander.id));
    assert_eq!(store.calls().content_deletes.len(), 2);
}

#[tokio::test]
async fn test_migration_with_several_exports_is_removed() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ContextRef::course(Uuid::now_v7());
    let migration = ContentMigration {
        id: Uuid::now_v7(),
        context: ctx,
        attachment_id: None,
        overview_attachment_id: None,
        exported_attachment_id: None,
        workflow_state: "imported".into(),
        created_at: long_ago(),
    };
    store.add_migration(migration.clone());
    let first_att = old_root(&store, ctx, "first.imscc");
    let second_att = old_root(&store, ctx, "second.imscc");
    let first = content_export(&store, Some(first_att.id), Some(migration.id));
    let second = content_export(&store, Some(second_att.id), Some(migration.id));

    let report = disposer(&store).delete_content_migrations().await;

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.artifacts_removed, 3);
    assert_eq!(report.destroyed, 2);
    assert!(store.content_export(first.id).is_none());
    assert!(store.content_export(second.id).is_none());
    assert!(store.migration(migration.id).is_none());
}

#[tokio::test]
async fn test_retained_sis_batch_sweeps_again_without_copying() {
    let store = Arc::new(MemoryStore::new());
    let account = store.default_account_id();
    let batch = SisBatch {
        id: Uuid::now_v7(),
        account_id: account,
        workflow_state: "imported".into(),
        created_at: long_ago(),
    };
    store.add_sis_batch(batch.clone());
    store.reference_sis_batch(account, batch.id);
    let csv = old_root(&store, ContextRef::sis_batch(batch.id), "users.csv");
    let copy = store.add_child(&csv, ContextRef::course(Uuid::now_v7()), "users.csv");
    let d = disposer(&store);

    let first = d.delete_sis_batches().await;
    assert_eq!(first.destroyed, 1);
    assert_eq!(first.retained, 1);
    let holder = store.attachment(copy.id).unwrap().root_attachment_id.unwrap();

    store.clear_calls();
    let second = d.delete_sis_batches().await;

    assert_eq!(second.destroyed, 0);
    assert_eq!(second.retained, 1);
    assert!(second.errors.is_empty());
    let calls = store.calls();
    assert!(calls.content_copies.is_empty());
    assert!(calls.content_deletes.is_empty());
    assert_eq!(store.content_of(holder).unwrap(), b"users.csv");
    assert_eq!(store.attachment(copy.id).unwrap().root_attachment_id, Some(holder));

    // Once nothing depends on the holder it goes with the batch's files.
    assert_eq!(d.destroy_attachment(copy.id).await.unwrap(), Destroyed::Removed);
    let third = d.delete_sis_batches().await;
    assert_eq!(third.destroyed, 1);
    assert!(store.attachment(holder).is_none());
    assert!(!store.has_content(holder));
}

#[tokio::test]
async fn test_disposal_runs_every_family_in_order() {
    let store = Arc::new(MemoryStore::new());
    let report = disposer(&store).delete_disposable_files().await;

    let families: Vec<&str> = report.sweeps.iter().map(|s| s.family).collect();
    assert_eq!(
        families,
        vec![
            logging::FAMILY_CONTENT_EXPORT,
            logging::FAMILY_SUBMISSION_EXPORT,
            logging::FAMILY_EPUB_EXPORT,
            logging::FAMILY_CONTENT_MIGRATION,
            logging::FAMILY_SIS_BATCH,
        ]
    );
    assert_eq!(report.total(), 0);
    assert!(!report.has_errors());
}

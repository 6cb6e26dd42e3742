//! Filesystem content store behaviour: missing files are outcomes, not errors.

use uuid::Uuid;
use zapper_db::{generate_storage_path, ContentStore, Error, FilesystemContentStore, StoreOutcome};

fn store() -> (tempfile::TempDir, FilesystemContentStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemContentStore::new(dir.path());
    (dir, store)
}

#[tokio::test]
async fn test_write_lands_at_sharded_path() {
    let (dir, store) = store();
    let id = Uuid::now_v7();

    store.write(id, b"hello").await.unwrap();

    let on_disk = std::fs::read(dir.path().join(generate_storage_path(&id))).unwrap();
    assert_eq!(on_disk, b"hello");
    assert!(store.exists(id).await.unwrap());
    assert_eq!(store.read(id).await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_write_leaves_no_temp_file() {
    let (dir, store) = store();
    let id = Uuid::now_v7();
    store.write(id, b"atomic").await.unwrap();

    let path = dir.path().join(generate_storage_path(&id));
    assert!(!path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_overwrite_replaces_content() {
    let (_dir, store) = store();
    let id = Uuid::now_v7();
    store.write(id, b"first").await.unwrap();
    store.write(id, b"second").await.unwrap();
    assert_eq!(store.read(id).await.unwrap(), b"second");
}

#[tokio::test]
async fn test_read_missing_is_content_not_found() {
    let (_dir, store) = store();
    let id = Uuid::now_v7();
    match store.read(id).await {
        Err(Error::ContentNotFound(missing)) => assert_eq!(missing, id),
        other => panic!("expected ContentNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_reports_not_found_on_second_call() {
    let (_dir, store) = store();
    let id = Uuid::now_v7();
    store.write(id, b"bytes").await.unwrap();

    assert_eq!(store.delete(id).await.unwrap(), StoreOutcome::Done);
    assert_eq!(store.delete(id).await.unwrap(), StoreOutcome::NotFound);
    assert!(!store.exists(id).await.unwrap());
}

#[tokio::test]
async fn test_thumbnail_delete_is_independent_of_content() {
    let (_dir, store) = store();
    let id = Uuid::now_v7();
    store.write(id, b"image").await.unwrap();
    store.write_thumbnail(id, b"thumb").await.unwrap();

    assert_eq!(store.delete_thumbnail(id).await.unwrap(), StoreOutcome::Done);
    assert!(!store.thumbnail_exists(id).await.unwrap());
    assert!(store.exists(id).await.unwrap());
    assert_eq!(
        store.delete_thumbnail(id).await.unwrap(),
        StoreOutcome::NotFound
    );
}

#[tokio::test]
async fn test_copy_duplicates_bytes_under_new_id() {
    let (_dir, store) = store();
    let from = Uuid::now_v7();
    let to = Uuid::now_v7();
    store.write(from, b"shared").await.unwrap();

    assert_eq!(store.copy(from, to).await.unwrap(), StoreOutcome::Done);
    store.delete(from).await.unwrap();
    assert_eq!(store.read(to).await.unwrap(), b"shared");
}

#[tokio::test]
async fn test_copy_of_missing_source_is_not_found() {
    let (_dir, store) = store();
    assert_eq!(
        store.copy(Uuid::now_v7(), Uuid::now_v7()).await.unwrap(),
        StoreOutcome::NotFound
    );
}

#[tokio::test]
async fn test_validate_round_trip() {
    let (_dir, store) = store();
    store.validate().await.unwrap();
}

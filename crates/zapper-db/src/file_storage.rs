//! Filesystem content store.
//!
//! Bytes are keyed by the id of the attachment that owns them:
//!
//! - content: `{base}/blobs/{hex2}/{hex2}/{uuid}.bin`
//! - thumbnail: `{base}/thumbnails/{hex2}/{hex2}/{uuid}.bin`
//!
//! Writes are atomic (temp file + rename). Deleting a missing file reports
//! `StoreOutcome::NotFound` instead of failing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use zapper_db::FilesystemContentStore;
//!
//! let store = FilesystemContentStore::new("/var/zapper/content");
//! store.validate().await?;
//! store.write(attachment.id, &data).await?;
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use zapper_core::{logging, ContentStore, Error, Result, StoreOutcome};

/// Local filesystem implementation of [`ContentStore`].
pub struct FilesystemContentStore {
    base_path: PathBuf,
}

impl FilesystemContentStore {
    /// Create a store rooted at `base_path`. Directories are created lazily.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn content_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(generate_storage_path(id))
    }

    fn thumbnail_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(generate_thumbnail_path(id))
    }

    /// Write a thumbnail for `id`.
    pub async fn write_thumbnail(&self, id: Uuid, data: &[u8]) -> Result<()> {
        write_atomic(&self.thumbnail_path(&id), data).await
    }

    pub async fn thumbnail_exists(&self, id: Uuid) -> Result<bool> {
        Ok(fs::try_exists(self.thumbnail_path(&id)).await?)
    }

    /// Round-trip a scratch file to catch permission or mount problems early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"zapper-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

async fn write_atomic(full_path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            warn!(
                subsystem = logging::CONTENT,
                parent = %parent.display(),
                error = %e,
                "create_dir_all failed"
            );
            e
        })?;
    }

    let temp_path = full_path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, full_path).await.map_err(|e| {
        warn!(
            subsystem = logging::CONTENT,
            from = %temp_path.display(),
            to = %full_path.display(),
            error = %e,
            "rename failed"
        );
        e
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(full_path, std::fs::Permissions::from_mode(0o644)).await?;
    }

    Ok(())
}

async fn remove_file(full_path: &Path) -> Result<StoreOutcome> {
    match fs::remove_file(full_path).await {
        Ok(()) => Ok(StoreOutcome::Done),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreOutcome::NotFound),
        Err(e) => Err(Error::Io(e)),
    }
}

#[async_trait]
impl ContentStore for FilesystemContentStore {
    async fn write(&self, id: Uuid, data: &[u8]) -> Result<()> {
        let full_path = self.content_path(&id);
        debug!(
            subsystem = logging::CONTENT,
            op = "write",
            attachment_id = %id,
            size = data.len(),
            "Writing content"
        );
        write_atomic(&full_path, data).await
    }

    async fn read(&self, id: Uuid) -> Result<Vec<u8>> {
        match fs::read(self.content_path(&id)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ContentNotFound(id)),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn copy(&self, from: Uuid, to: Uuid) -> Result<StoreOutcome> {
        let data = match fs::read(self.content_path(&from)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreOutcome::NotFound),
            Err(e) => return Err(Error::Io(e)),
        };
        write_atomic(&self.content_path(&to), &data).await?;
        Ok(StoreOutcome::Done)
    }

    async fn delete(&self, id: Uuid) -> Result<StoreOutcome> {
        debug!(
            subsystem = logging::CONTENT,
            op = "delete",
            attachment_id = %id,
            "Deleting content"
        );
        remove_file(&self.content_path(&id)).await
    }

    async fn delete_thumbnail(&self, id: Uuid) -> Result<StoreOutcome> {
        remove_file(&self.thumbnail_path(&id)).await
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(fs::try_exists(self.content_path(&id)).await?)
    }
}

fn sharded(prefix: &str, uuid: &Uuid) -> String {
    let hex = uuid.simple().to_string();
    format!(
        "{}/{}/{}/{}.bin",
        prefix,
        &hex[0..2],
        &hex[2..4],
        uuid.as_hyphenated()
    )
}

/// Generate the content path for an attachment id.
///
/// Example: `blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin`
pub fn generate_storage_path(uuid: &Uuid) -> String {
    sharded("blobs", uuid)
}

/// Generate the thumbnail path for an attachment id.
pub fn generate_thumbnail_path(uuid: &Uuid) -> String {
    sharded("thumbnails", uuid)
}

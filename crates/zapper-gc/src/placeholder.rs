//! Placeholder roots: one shared "file removed" attachment per media class.
//!
//! Placeholders are root attachments owned by the default account and found
//! by stored filename (`{base}.png`, `{base}.pdf`). The registry creates a
//! missing one from its asset bytes and caches the row for its lifetime.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use zapper_core::{
    compute_content_hash, detect_content_type, logging, Attachment, AttachmentRepository,
    AttachmentState, ContentStore, ContextRef, Error, MediaClass, NewAttachment, Result,
};

static EMBEDDED_PNG: &[u8] = include_bytes!("../assets/file_removed.png");
static EMBEDDED_PDF: &[u8] = include_bytes!("../assets/file_removed.pdf");

/// Where placeholder bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaceholderAssets {
    /// `file_removed.png` / `file_removed.pdf` inside this directory.
    Directory(PathBuf),
    /// Assets compiled into the library.
    #[default]
    Embedded,
}

impl PlaceholderAssets {
    /// `ZAPPER_PLACEHOLDER_DIR` if set, embedded assets otherwise.
    pub fn from_env() -> Self {
        match std::env::var("ZAPPER_PLACEHOLDER_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::Directory(PathBuf::from(dir.trim())),
            _ => Self::Embedded,
        }
    }

    /// Read the asset bytes for `class`.
    pub async fn load(&self, class: MediaClass) -> Result<Vec<u8>> {
        match self {
            Self::Embedded => Ok(match class {
                MediaClass::Image => EMBEDDED_PNG.to_vec(),
                MediaClass::Document => EMBEDDED_PDF.to_vec(),
            }),
            Self::Directory(dir) => {
                let path = dir.join(class.asset_name());
                tokio::fs::read(&path).await.map_err(|e| {
                    Error::Placeholder(format!("cannot read {}: {}", path.display(), e))
                })
            }
        }
    }
}

/// Identity of the placeholder rows, checkable without touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderKey {
    pub owner: ContextRef,
    pub base_name: String,
}

impl PlaceholderKey {
    pub fn new(owner: ContextRef, base_name: impl Into<String>) -> Self {
        Self {
            owner,
            base_name: base_name.into(),
        }
    }

    pub fn filename(&self, class: MediaClass) -> String {
        format!("{}{}", self.base_name, class.extension())
    }

    /// Whether `att` is one of the placeholder roots.
    pub fn matches(&self, att: &Attachment) -> bool {
        att.is_root()
            && att.context == self.owner
            && [MediaClass::Image, MediaClass::Document]
                .iter()
                .any(|class| att.filename == self.filename(*class))
    }
}

/// Find-or-create cache of the two placeholder roots.
pub struct PlaceholderRegistry {
    attachments: Arc<dyn AttachmentRepository>,
    content: Arc<dyn ContentStore>,
    assets: PlaceholderAssets,
    key: PlaceholderKey,
    image: OnceCell<Attachment>,
    document: OnceCell<Attachment>,
}

impl PlaceholderRegistry {
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        content: Arc<dyn ContentStore>,
        key: PlaceholderKey,
        assets: PlaceholderAssets,
    ) -> Self {
        Self {
            attachments,
            content,
            assets,
            key,
            image: OnceCell::new(),
            document: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &PlaceholderKey {
        &self.key
    }

    /// The placeholder root for `class`, created on first demand.
    ///
    /// Concurrent first calls share one lookup; a failed lookup is not
    /// cached and will be retried by the next call.
    pub async fn get(&self, class: MediaClass) -> Result<Attachment> {
        let cell = match class {
            MediaClass::Image => &self.image,
            MediaClass::Document => &self.document,
        };
        cell.get_or_try_init(|| self.find_or_create(class))
            .await
            .cloned()
    }

    /// Whether `id` is a placeholder already resolved by this registry.
    pub fn is_cached_placeholder(&self, id: Uuid) -> bool {
        [&self.image, &self.document]
            .iter()
            .any(|cell| cell.get().is_some_and(|p| p.id == id))
    }

    async fn find_or_create(&self, class: MediaClass) -> Result<Attachment> {
        let filename = self.key.filename(class);

        if let Some(existing) = self
            .attachments
            .find_root_by_filename(&filename, &self.key.owner)
            .await?
        {
            if !self.content.exists(existing.id).await? {
                warn!(
                    subsystem = logging::PLACEHOLDER,
                    op = "restore",
                    placeholder_id = %existing.id,
                    class = %class,
                    "Placeholder bytes missing, rewriting from assets"
                );
                let data = self.assets.load(class).await?;
                self.content.write(existing.id, &data).await?;
            }
            debug!(
                subsystem = logging::PLACEHOLDER,
                op = "found",
                placeholder_id = %existing.id,
                class = %class,
                "Using existing placeholder"
            );
            return Ok(existing);
        }

        let data = self.assets.load(class).await?;
        let content_type = detect_content_type(&filename, &data, class.content_type());
        if MediaClass::from_content_type(&content_type) != class {
            return Err(Error::Placeholder(format!(
                "{} asset detected as {}, expected an {} file",
                filename, content_type, class
            )));
        }

        let req = NewAttachment {
            id: Uuid::now_v7(),
            context: self.key.owner,
            root_attachment_id: None,
            filename: filename.clone(),
            display_name: filename,
            content_type,
            content_hash: compute_content_hash(&data),
            size_bytes: data.len() as i64,
            state: AttachmentState::Available,
        };

        self.content.write(req.id, &data).await?;
        let created = self.attachments.insert(req).await?;

        info!(
            subsystem = logging::PLACEHOLDER,
            op = "create",
            placeholder_id = %created.id,
            class = %class,
            size = created.size_bytes,
            "Created placeholder"
        );
        Ok(created)
    }
}

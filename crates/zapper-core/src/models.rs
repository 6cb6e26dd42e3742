//! Data models for attachments, artifact families, and terms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// CONTEXTS
// =============================================================================

/// Kind of record that owns an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKind {
    Account,
    Course,
    Group,
    User,
    Assignment,
    QuizSubmission,
    ContentExport,
    EpubExport,
    ContentMigration,
    SisBatch,
}

impl ContextKind {
    /// Name stored in the `context_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Course => "Course",
            Self::Group => "Group",
            Self::User => "User",
            Self::Assignment => "Assignment",
            Self::QuizSubmission => "QuizSubmission",
            Self::ContentExport => "ContentExport",
            Self::EpubExport => "EpubExport",
            Self::ContentMigration => "ContentMigration",
            Self::SisBatch => "SisBatch",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContextKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Account" => Ok(Self::Account),
            "Course" => Ok(Self::Course),
            "Group" => Ok(Self::Group),
            "User" => Ok(Self::User),
            "Assignment" => Ok(Self::Assignment),
            "QuizSubmission" => Ok(Self::QuizSubmission),
            "ContentExport" => Ok(Self::ContentExport),
            "EpubExport" => Ok(Self::EpubExport),
            "ContentMigration" => Ok(Self::ContentMigration),
            "SisBatch" => Ok(Self::SisBatch),
            _ => Err(format!("Invalid context type: {}", s)),
        }
    }
}

/// Typed reference to the record owning an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRef {
    pub kind: ContextKind,
    pub id: Uuid,
}

impl ContextRef {
    pub fn new(kind: ContextKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn account(id: Uuid) -> Self {
        Self::new(ContextKind::Account, id)
    }

    pub fn course(id: Uuid) -> Self {
        Self::new(ContextKind::Course, id)
    }

    pub fn assignment(id: Uuid) -> Self {
        Self::new(ContextKind::Assignment, id)
    }

    pub fn epub_export(id: Uuid) -> Self {
        Self::new(ContextKind::EpubExport, id)
    }

    pub fn sis_batch(id: Uuid) -> Self {
        Self::new(ContextKind::SisBatch, id)
    }
}

impl std::fmt::Display for ContextRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Lifecycle state of an attachment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    #[default]
    Available,
    Deleted,
    Pending,
    Errored,
    /// Generated archive (submission downloads).
    Zipped,
    /// Content holder created by demotion; never listed as a user file.
    Hidden,
}

impl std::fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Deleted => write!(f, "deleted"),
            Self::Pending => write!(f, "pending"),
            Self::Errored => write!(f, "errored"),
            Self::Zipped => write!(f, "zipped"),
            Self::Hidden => write!(f, "hidden"),
        }
    }
}

impl std::str::FromStr for AttachmentState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "deleted" => Ok(Self::Deleted),
            "pending" => Ok(Self::Pending),
            "errored" => Ok(Self::Errored),
            "zipped" => Ok(Self::Zipped),
            "hidden" => Ok(Self::Hidden),
            _ => Err(format!("Invalid attachment state: {}", s)),
        }
    }
}

/// Placeholder media class, chosen from an attachment's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Image,
    Document,
}

impl MediaClass {
    /// Classify a content type. Only the fixed image MIME list maps to `Image`.
    pub fn from_content_type(content_type: &str) -> Self {
        if defaults::IMAGE_CONTENT_TYPES.contains(&content_type) {
            Self::Image
        } else {
            Self::Document
        }
    }

    /// Extension (with leading dot) of this class's placeholder file.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => ".png",
            Self::Document => ".pdf",
        }
    }

    /// Content type used when the placeholder bytes are not recognisable.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Document => "application/pdf",
        }
    }

    /// File name of the placeholder asset in a placeholder directory.
    pub fn asset_name(&self) -> &'static str {
        match self {
            Self::Image => "file_removed.png",
            Self::Document => "file_removed.pdf",
        }
    }
}

impl std::fmt::Display for MediaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Attachment metadata row.
///
/// A row with `root_attachment_id == None` owns its content bytes; any other
/// row shares the bytes of its root and never has bytes of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub context: ContextRef,
    pub root_attachment_id: Option<Uuid>,
    pub filename: String,
    pub display_name: String,
    pub content_type: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub state: AttachmentState,
    pub has_thumbnail: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Attachment {
    /// Whether this row owns its content bytes.
    pub fn is_root(&self) -> bool {
        self.root_attachment_id.is_none()
    }

    /// Extension of the stored filename, including the leading dot.
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.filename)
    }

    /// Check the fields a save must satisfy.
    pub fn validate(&self) -> crate::Result<()> {
        if self.filename.trim().is_empty() {
            return Err(crate::Error::Validation(format!(
                "attachment {} has an empty filename",
                self.id
            )));
        }
        if self.display_name.trim().is_empty() {
            return Err(crate::Error::Validation(format!(
                "attachment {} has an empty display name",
                self.id
            )));
        }
        if self.size_bytes < 0 {
            return Err(crate::Error::Validation(format!(
                "attachment {} has negative size {}",
                self.id, self.size_bytes
            )));
        }
        if self.root_attachment_id == Some(self.id) {
            return Err(crate::Error::Validation(format!(
                "attachment {} cannot be its own root",
                self.id
            )));
        }
        Ok(())
    }
}

/// Extension (with leading dot) of a file name, if it has one.
pub fn extension_of(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(&name[dot..])
}

/// Request for inserting a new attachment row.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub id: Uuid,
    pub context: ContextRef,
    pub root_attachment_id: Option<Uuid>,
    pub filename: String,
    pub display_name: String,
    pub content_type: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub state: AttachmentState,
}

impl NewAttachment {
    /// Copy of `source`'s metadata under a fresh id, as a root in `state`.
    pub fn holder_of(source: &Attachment, state: AttachmentState) -> Self {
        Self {
            id: Uuid::now_v7(),
            context: source.context,
            root_attachment_id: None,
            filename: source.filename.clone(),
            display_name: source.display_name.clone(),
            content_type: source.content_type.clone(),
            content_hash: source.content_hash.clone(),
            size_bytes: source.size_bytes,
            state,
        }
    }
}

/// Predicate for attachment queries. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct AttachmentFilter {
    /// Owning context must be one of these.
    pub contexts: Option<Vec<ContextRef>>,
    /// Owning context must be of this kind.
    pub context_kind: Option<ContextKind>,
    pub states: Option<Vec<AttachmentState>>,
    pub exclude_states: Option<Vec<AttachmentState>>,
    pub display_name: Option<String>,
    /// `created_at` strictly earlier than this.
    pub created_before: Option<DateTime<Utc>>,
    /// `deleted_at` strictly earlier than this.
    pub deleted_before: Option<DateTime<Utc>>,
}

impl AttachmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_contexts(mut self, contexts: Vec<ContextRef>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn of_kind(mut self, kind: ContextKind) -> Self {
        self.context_kind = Some(kind);
        self
    }

    pub fn with_state(mut self, state: AttachmentState) -> Self {
        self.states.get_or_insert_with(Vec::new).push(state);
        self
    }

    pub fn without_state(mut self, state: AttachmentState) -> Self {
        self.exclude_states.get_or_insert_with(Vec::new).push(state);
        self
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn deleted_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.deleted_before = Some(cutoff);
        self
    }

    /// Whether an attachment satisfies every set field.
    pub fn matches(&self, att: &Attachment) -> bool {
        if let Some(contexts) = &self.contexts {
            if !contexts.contains(&att.context) {
                return false;
            }
        }
        if let Some(kind) = self.context_kind {
            if att.context.kind != kind {
                return false;
            }
        }
        if let Some(states) = &self.states {
            if !states.contains(&att.state) {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_states {
            if excluded.contains(&att.state) {
                return false;
            }
        }
        if let Some(name) = &self.display_name {
            if &att.display_name != name {
                return false;
            }
        }
        if let Some(cutoff) = self.created_before {
            if att.created_at >= cutoff {
                return false;
            }
        }
        if let Some(cutoff) = self.deleted_before {
            match att.deleted_at {
                Some(deleted_at) if deleted_at < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

/// Outcome of a store operation that may legitimately miss or collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Done,
    NotFound,
    /// Another row still references the target.
    ConstraintViolation(String),
}

impl StoreOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

// =============================================================================
// ARTIFACT FAMILIES
// =============================================================================

/// Workflow state of a content export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Created,
    Exporting,
    Exported,
    Failed,
    Deleted,
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Exporting => write!(f, "exporting"),
            Self::Exported => write!(f, "exported"),
            Self::Failed => write!(f, "failed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for ExportState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "exporting" => Ok(Self::Exporting),
            "exported" => Ok(Self::Exported),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid export state: {}", s)),
        }
    }
}

/// Generated course/user export. Supports a soft-deleted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentExport {
    pub id: Uuid,
    pub context: ContextRef,
    pub attachment_id: Option<Uuid>,
    pub content_migration_id: Option<Uuid>,
    pub workflow_state: ExportState,
    pub created_at: DateTime<Utc>,
}

/// ePub conversion of a content export. Owns attachments through their context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpubExport {
    pub id: Uuid,
    pub course_id: Uuid,
    pub content_export_id: Option<Uuid>,
    pub workflow_state: String,
    pub created_at: DateTime<Utc>,
}

/// Course copy/import run. Has no deleted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMigration {
    pub id: Uuid,
    pub context: ContextRef,
    pub attachment_id: Option<Uuid>,
    pub overview_attachment_id: Option<Uuid>,
    pub exported_attachment_id: Option<Uuid>,
    pub workflow_state: String,
    pub created_at: DateTime<Utc>,
}

impl ContentMigration {
    /// Every attachment id the migration row references.
    pub fn attachment_ids(&self) -> Vec<Uuid> {
        [
            self.attachment_id,
            self.overview_attachment_id,
            self.exported_attachment_id,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// SIS import batch. Accounts may keep referencing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SisBatch {
    pub id: Uuid,
    pub account_id: Uuid,
    pub workflow_state: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// TERMS
// =============================================================================

/// Caller-supplied reference to an enrollment term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermIdentifier {
    Id(Uuid),
    SisSourceId(String),
}

impl std::fmt::Display for TermIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{}", id),
            Self::SisSourceId(sis) => write!(f, "sis:{}", sis),
        }
    }
}

/// Resolved enrollment term with the courses it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub id: Uuid,
    pub name: String,
    pub sis_source_id: Option<String>,
    pub course_ids: Vec<Uuid>,
}

impl Term {
    pub fn course_contexts(&self) -> Vec<ContextRef> {
        self.course_ids.iter().copied().map(ContextRef::course).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attachment(content_type: &str) -> Attachment {
        let now = Utc::now();
        Attachment {
            id: Uuid::now_v7(),
            context: ContextRef::course(Uuid::now_v7()),
            root_attachment_id: None,
            filename: "1234-cat.jpg".to_string(),
            display_name: "cat.jpg".to_string(),
            content_type: content_type.to_string(),
            content_hash: "blake3:00".to_string(),
            size_bytes: 42,
            state: AttachmentState::Available,
            has_thumbnail: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_media_class_image_types() {
        for ct in [
            "image/gif",
            "image/jpeg",
            "image/pjpeg",
            "image/png",
            "image/x-png",
            "image/bmp",
        ] {
            assert_eq!(MediaClass::from_content_type(ct), MediaClass::Image, "{ct}");
        }
    }

    #[test]
    fn test_media_class_everything_else_is_document() {
        for ct in ["image/svg+xml", "image/webp", "application/pdf", "text/plain", ""] {
            assert_eq!(
                MediaClass::from_content_type(ct),
                MediaClass::Document,
                "{ct}"
            );
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("cat.jpg"), Some(".jpg"));
        assert_eq!(extension_of("archive.tar.gz"), Some(".gz"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_attachment_state_round_trip_strings() {
        for state in [
            AttachmentState::Available,
            AttachmentState::Deleted,
            AttachmentState::Pending,
            AttachmentState::Errored,
            AttachmentState::Zipped,
            AttachmentState::Hidden,
        ] {
            assert_eq!(state.to_string().parse::<AttachmentState>(), Ok(state));
        }
        assert!("bogus".parse::<AttachmentState>().is_err());
    }

    #[test]
    fn test_context_kind_parse() {
        assert_eq!("SisBatch".parse::<ContextKind>(), Ok(ContextKind::SisBatch));
        assert!("sis_batch".parse::<ContextKind>().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_display_name() {
        let mut att = attachment("image/png");
        att.display_name = "  ".to_string();
        assert!(matches!(att.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_self_root() {
        let mut att = attachment("image/png");
        att.root_attachment_id = Some(att.id);
        assert!(att.validate().is_err());
    }

    #[test]
    fn test_filter_matches_deleted_before() {
        let mut att = attachment("text/plain");
        let cutoff = Utc::now();
        let filter = AttachmentFilter::new()
            .with_state(AttachmentState::Deleted)
            .deleted_before(cutoff);

        att.state = AttachmentState::Deleted;
        assert!(!filter.matches(&att), "no deleted_at means not old enough");

        att.deleted_at = Some(cutoff - Duration::days(1));
        assert!(filter.matches(&att));

        att.deleted_at = Some(cutoff);
        assert!(!filter.matches(&att), "cutoff is exclusive");
    }

    #[test]
    fn test_filter_excluded_states() {
        let mut att = attachment("application/zip");
        let filter = AttachmentFilter::new()
            .of_kind(ContextKind::Course)
            .without_state(AttachmentState::Zipped);
        assert!(filter.matches(&att));
        att.state = AttachmentState::Zipped;
        assert!(!filter.matches(&att));
    }

    #[test]
    fn test_holder_copies_metadata_under_new_id() {
        let mut source = attachment("image/jpeg");
        source.has_thumbnail = true;
        let holder = NewAttachment::holder_of(&source, AttachmentState::Hidden);
        assert_ne!(holder.id, source.id);
        assert_eq!(holder.root_attachment_id, None);
        assert_eq!(holder.filename, source.filename);
        assert_eq!(holder.content_hash, source.content_hash);
        assert_eq!(holder.context, source.context);
        assert_eq!(holder.state, AttachmentState::Hidden);
    }

    #[test]
    fn test_migration_attachment_ids_skip_missing() {
        let migration = ContentMigration {
            id: Uuid::now_v7(),
            context: ContextRef::course(Uuid::now_v7()),
            attachment_id: Some(Uuid::now_v7()),
            overview_attachment_id: None,
            exported_attachment_id: Some(Uuid::now_v7()),
            workflow_state: "imported".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(migration.attachment_ids().len(), 2);
    }
}

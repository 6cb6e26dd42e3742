//! Centralized default constants for file-zapper.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by area.

// =============================================================================
// BATCHING
// =============================================================================

/// Attachment ids processed per deduplication batch.
pub const REPLACE_BATCH_SIZE: usize = 500;

/// Rows fetched per page by the retention sweeps.
pub const SWEEP_PAGE_SIZE: i64 = 500;

// =============================================================================
// RETENTION
// =============================================================================

/// Age after which soft-deleted attachments lose their bytes.
pub const CUTOFF_SOFT_DELETED_DAYS: i64 = 730;

/// Age after which content exports, submission exports and migrations are purged.
pub const CUTOFF_EXPORTS_DAYS: i64 = 730;

/// Age after which ePub exports are purged.
pub const CUTOFF_EPUBS_DAYS: i64 = 730;

/// Age after which SIS import batches are purged.
pub const CUTOFF_SIS_IMPORTS_DAYS: i64 = 365;

// =============================================================================
// PLACEHOLDERS
// =============================================================================

/// Base name of the two placeholder files (`{base}.pdf`, `{base}.png`).
pub const PLACEHOLDER_BASE_NAME: &str = "file_removed";

/// Content types that select the image placeholder. Everything else gets the
/// document placeholder.
pub const IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/gif",
    "image/jpeg",
    "image/pjpeg",
    "image/png",
    "image/x-png",
    "image/bmp",
];

// =============================================================================
// SUBMISSION EXPORTS
// =============================================================================

/// Display name given to generated "download all submissions" archives.
pub const SUBMISSIONS_EXPORT_NAME: &str = "submissions.zip";

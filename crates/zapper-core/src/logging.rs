//! Structured logging conventions for file-zapper.
//!
//! Every event carries `subsystem` (one of the values below) and `op`, plus
//! entity fields such as `attachment_id`, `root_id`, `placeholder_id`,
//! `family`, `artifact_id` and `cutoff` where they apply.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Batch or sweep aborted, requires operator attention |
//! | WARN  | Tolerated anomaly (missing bytes, retained batch, lost claim) |
//! | INFO  | Run and sweep completions with counts |
//! | DEBUG | Per-record decisions |
//! | TRACE | Per-page iteration |

// ─── Subsystem values ──────────────────────────────────────────────────────

/// Placeholder substitution engine.
pub const DEDUP: &str = "dedup";

/// Retention sweeps.
pub const DISPOSER: &str = "disposer";

/// Placeholder find-or-create.
pub const PLACEHOLDER: &str = "placeholder";

/// Candidate id collection for terms.
pub const CANDIDATES: &str = "candidates";

/// Database layer.
pub const DATABASE: &str = "database";

/// Content byte store.
pub const CONTENT: &str = "content";

// ─── Family values ─────────────────────────────────────────────────────────

pub const FAMILY_SOFT_DELETED: &str = "soft_deleted";
pub const FAMILY_CONTENT_EXPORT: &str = "content_export";
pub const FAMILY_SUBMISSION_EXPORT: &str = "submission_export";
pub const FAMILY_EPUB_EXPORT: &str = "epub_export";
pub const FAMILY_CONTENT_MIGRATION: &str = "content_migration";
pub const FAMILY_SIS_BATCH: &str = "sis_batch";

//! Retention policy: one cutoff per artifact family plus the placeholder name.
//!
//! # Environment
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ZAPPER_CUTOFF_SOFT_DELETED` | `730d` | Soft-deleted attachments older than this lose their bytes |
//! | `ZAPPER_CUTOFF_EXPORTS` | `730d` | Content exports, submission exports, migrations |
//! | `ZAPPER_CUTOFF_EPUBS` | `730d` | ePub exports |
//! | `ZAPPER_CUTOFF_SIS_IMPORTS` | `365d` | SIS import batches |
//! | `ZAPPER_PLACEHOLDER_BASE_NAME` | `file_removed` | Base of `{base}.pdf` / `{base}.png` |
//!
//! Cutoffs accept an RFC 3339 timestamp (`2019-06-01T00:00:00Z`), a date
//! (`2019-06-01`, midnight UTC) or an age in days (`730d` or `730`).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::MediaClass;

/// Retention cutoffs and placeholder naming, read once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Soft-deleted attachments with `deleted_at` before this are purged.
    #[serde(default = "default_cutoff_soft_deleted")]
    pub cutoff_soft_deleted: DateTime<Utc>,
    /// Content exports, submission exports and content migrations.
    #[serde(default = "default_cutoff_exports")]
    pub cutoff_exports: DateTime<Utc>,
    #[serde(default = "default_cutoff_epubs")]
    pub cutoff_epubs: DateTime<Utc>,
    #[serde(default = "default_cutoff_sis_imports")]
    pub cutoff_sis_imports: DateTime<Utc>,
    #[serde(default = "default_placeholder_base_name")]
    pub placeholder_base_name: String,
}

fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

fn default_cutoff_soft_deleted() -> DateTime<Utc> {
    days_ago(defaults::CUTOFF_SOFT_DELETED_DAYS)
}

fn default_cutoff_exports() -> DateTime<Utc> {
    days_ago(defaults::CUTOFF_EXPORTS_DAYS)
}

fn default_cutoff_epubs() -> DateTime<Utc> {
    days_ago(defaults::CUTOFF_EPUBS_DAYS)
}

fn default_cutoff_sis_imports() -> DateTime<Utc> {
    days_ago(defaults::CUTOFF_SIS_IMPORTS_DAYS)
}

fn default_placeholder_base_name() -> String {
    defaults::PLACEHOLDER_BASE_NAME.to_string()
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::relative_to(Utc::now())
    }
}

impl RetentionPolicy {
    /// Default cutoffs measured back from `now`.
    pub fn relative_to(now: DateTime<Utc>) -> Self {
        Self {
            cutoff_soft_deleted: now - Duration::days(defaults::CUTOFF_SOFT_DELETED_DAYS),
            cutoff_exports: now - Duration::days(defaults::CUTOFF_EXPORTS_DAYS),
            cutoff_epubs: now - Duration::days(defaults::CUTOFF_EPUBS_DAYS),
            cutoff_sis_imports: now - Duration::days(defaults::CUTOFF_SIS_IMPORTS_DAYS),
            placeholder_base_name: default_placeholder_base_name(),
        }
    }

    /// Load configuration from environment variables with fallback to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(Utc::now(), |key| std::env::var(key).ok())
    }

    /// Build a policy from an arbitrary key lookup.
    pub fn from_lookup<F>(now: DateTime<Utc>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::relative_to(now);

        let cutoffs = [
            ("ZAPPER_CUTOFF_SOFT_DELETED", &mut policy.cutoff_soft_deleted),
            ("ZAPPER_CUTOFF_EXPORTS", &mut policy.cutoff_exports),
            ("ZAPPER_CUTOFF_EPUBS", &mut policy.cutoff_epubs),
            ("ZAPPER_CUTOFF_SIS_IMPORTS", &mut policy.cutoff_sis_imports),
        ];
        for (key, slot) in cutoffs {
            if let Some(val) = lookup(key) {
                match parse_cutoff(&val, now) {
                    Some(cutoff) => *slot = cutoff,
                    None => tracing::warn!(key, value = %val, "Invalid cutoff, using default"),
                }
            }
        }

        if let Some(val) = lookup("ZAPPER_PLACEHOLDER_BASE_NAME") {
            let trimmed = val.trim();
            if trimmed.is_empty() {
                tracing::warn!("Empty ZAPPER_PLACEHOLDER_BASE_NAME, using default");
            } else {
                policy.placeholder_base_name = trimmed.to_string();
            }
        }

        policy
    }

    pub fn with_cutoff_soft_deleted(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff_soft_deleted = cutoff;
        self
    }

    pub fn with_cutoff_exports(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff_exports = cutoff;
        self
    }

    pub fn with_cutoff_epubs(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff_epubs = cutoff;
        self
    }

    pub fn with_cutoff_sis_imports(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff_sis_imports = cutoff;
        self
    }

    pub fn with_placeholder_base_name(mut self, name: impl Into<String>) -> Self {
        self.placeholder_base_name = name.into();
        self
    }

    /// Stored filename of the placeholder for `class`.
    pub fn placeholder_filename(&self, class: MediaClass) -> String {
        format!("{}{}", self.placeholder_base_name, class.extension())
    }

    /// Reject cutoffs later than `now` and unusable placeholder names.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let cutoffs = [
            ("cutoff_soft_deleted", self.cutoff_soft_deleted),
            ("cutoff_exports", self.cutoff_exports),
            ("cutoff_epubs", self.cutoff_epubs),
            ("cutoff_sis_imports", self.cutoff_sis_imports),
        ];
        for (name, cutoff) in cutoffs {
            if cutoff > now {
                return Err(Error::Config(format!(
                    "{} ({}) is in the future",
                    name, cutoff
                )));
            }
        }

        let base = &self.placeholder_base_name;
        if base.trim().is_empty() {
            return Err(Error::Config("placeholder_base_name is empty".into()));
        }
        if base.contains(['/', '\\']) || base.contains('\0') {
            return Err(Error::Config(format!(
                "placeholder_base_name {:?} must be a bare file name",
                base
            )));
        }
        Ok(())
    }
}

/// Parse a cutoff as an RFC 3339 timestamp, a date, or an age in days.
pub fn parse_cutoff(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    let days = value.strip_suffix('d').unwrap_or(value);
    match days.parse::<i64>() {
        Ok(days) if days >= 0 => Some(now - Duration::days(days)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_match_original_retention() {
        let policy = RetentionPolicy::relative_to(now());
        assert_eq!(policy.cutoff_soft_deleted, now() - Duration::days(730));
        assert_eq!(policy.cutoff_exports, now() - Duration::days(730));
        assert_eq!(policy.cutoff_epubs, now() - Duration::days(730));
        assert_eq!(policy.cutoff_sis_imports, now() - Duration::days(365));
        assert_eq!(policy.placeholder_base_name, "file_removed");
    }

    #[test]
    fn test_placeholder_filenames() {
        let policy = RetentionPolicy::relative_to(now()).with_placeholder_base_name("gone_2019");
        assert_eq!(policy.placeholder_filename(MediaClass::Image), "gone_2019.png");
        assert_eq!(policy.placeholder_filename(MediaClass::Document), "gone_2019.pdf");
    }

    #[test]
    fn test_parse_cutoff_forms() {
        assert_eq!(parse_cutoff("30d", now()), Some(now() - Duration::days(30)));
        assert_eq!(parse_cutoff("30", now()), Some(now() - Duration::days(30)));
        assert_eq!(
            parse_cutoff("2019-06-01", now()),
            Some(Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_cutoff("2019-06-01T10:00:00+02:00", now()),
            Some(Utc.with_ymd_and_hms(2019, 6, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(parse_cutoff("-5d", now()), None);
        assert_eq!(parse_cutoff("soon", now()), None);
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_invalid() {
        let vars: HashMap<&str, &str> = [
            ("ZAPPER_CUTOFF_SIS_IMPORTS", "90d"),
            ("ZAPPER_CUTOFF_EPUBS", "whenever"),
            ("ZAPPER_PLACEHOLDER_BASE_NAME", "  removed_2019 "),
        ]
        .into_iter()
        .collect();

        let policy = RetentionPolicy::from_lookup(now(), |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(policy.cutoff_sis_imports, now() - Duration::days(90));
        assert_eq!(policy.cutoff_epubs, now() - Duration::days(730));
        assert_eq!(policy.placeholder_base_name, "removed_2019");
    }

    #[test]
    fn test_validate_rejects_future_cutoff() {
        let policy = RetentionPolicy::relative_to(now())
            .with_cutoff_exports(now() + Duration::days(1));
        assert!(matches!(policy.validate(now()), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_path_like_base_name() {
        let policy = RetentionPolicy::relative_to(now()).with_placeholder_base_name("../etc/x");
        assert!(policy.validate(now()).is_err());
        let policy = RetentionPolicy::relative_to(now()).with_placeholder_base_name("");
        assert!(policy.validate(now()).is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(RetentionPolicy::relative_to(now()).validate(now()).is_ok());
    }

    #[test]
    fn test_deserialize_partial_document_fills_defaults() {
        let policy: RetentionPolicy =
            serde_json::from_str(r#"{"placeholder_base_name":"x","cutoff_epubs":"2020-01-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(policy.placeholder_base_name, "x");
        assert_eq!(
            policy.cutoff_epubs,
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(policy.cutoff_sis_imports < Utc::now());
    }
}

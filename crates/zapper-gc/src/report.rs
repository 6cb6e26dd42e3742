//! Run reports returned by the engines.

use serde::Serialize;

/// Counts from one deduplication run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    /// Roots whose bytes were deleted and replaced by a placeholder.
    pub replaced: u64,
    /// Children moved from another root to a placeholder.
    pub repointed: u64,
    /// Attachments that already pointed at their placeholder.
    pub already_replaced: u64,
    /// Placeholders, lost claims and ids with no row.
    pub skipped: u64,
    /// Holder rows created for the children of replaced roots.
    pub demoted: u64,
    pub failed_records: u64,
    pub failed_batches: u64,
    pub errors: Vec<String>,
}

impl ReplaceReport {
    /// Attachments accounted for, whatever happened to them.
    pub fn total(&self) -> u64 {
        self.replaced + self.repointed + self.already_replaced + self.skipped + self.failed_records
    }

    /// Whether content bytes were deleted.
    pub fn has_deletions(&self) -> bool {
        self.replaced > 0
    }

    pub fn is_clean(&self) -> bool {
        self.failed_records == 0 && self.failed_batches == 0
    }
}

/// Counts from one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub family: &'static str,
    /// Attachments whose rows were removed.
    pub destroyed: u64,
    /// Artifact rows deleted or moved to the deleted state.
    pub artifacts_removed: u64,
    /// Rows left in place because something still references them.
    pub retained: u64,
    /// Placeholder roots left alone.
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            ..Default::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.destroyed + self.artifacts_removed
    }
}

/// Per-sweep results of `delete_disposable_files`, in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisposalReport {
    pub sweeps: Vec<SweepReport>,
}

impl DisposalReport {
    pub fn total(&self) -> u64 {
        self.sweeps.iter().map(SweepReport::total).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.sweeps.iter().any(|s| !s.errors.is_empty())
    }

    pub fn sweep(&self, family: &str) -> Option<&SweepReport> {
        self.sweeps.iter().find(|s| s.family == family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_report_total() {
        let report = ReplaceReport {
            replaced: 2,
            repointed: 3,
            already_replaced: 1,
            skipped: 1,
            failed_records: 1,
            ..Default::default()
        };
        assert_eq!(report.total(), 8);
        assert!(report.has_deletions());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_disposal_report_aggregates() {
        let mut a = SweepReport::new("content_export");
        a.destroyed = 2;
        a.artifacts_removed = 2;
        let mut b = SweepReport::new("sis_batch");
        b.retained = 1;
        b.errors.push("boom".into());
        let report = DisposalReport { sweeps: vec![a, b] };

        assert_eq!(report.total(), 4);
        assert!(report.has_errors());
        assert_eq!(report.sweep("sis_batch").map(|s| s.retained), Some(1));
    }
}

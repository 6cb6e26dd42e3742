//! Placeholder substitution.
//!
//! Each attachment handed to [`Deduplicator::replace`] ends up as a child of
//! the placeholder for its media class. Roots lose their bytes (after any
//! children are handed a holder copy); children are only re-pointed.
//!
//! The root pointer is claimed with a compare-and-set before any bytes are
//! touched, so two workers never delete the same content and a record whose
//! delete failed is never revisited.

use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use zapper_core::{defaults, logging, Attachment, MediaClass, Result};

use crate::candidates::dedup_preserving_order;
use crate::lifecycle::{apply_placeholder, carries_placeholder, demote, purge_content};
use crate::placeholder::PlaceholderRegistry;
use crate::report::ReplaceReport;
use crate::Stores;

/// What happened to one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Root bytes deleted; `demoted` when a holder took over its children.
    Replaced { demoted: bool },
    /// Child moved to the placeholder, or placeholder metadata repaired.
    Repointed,
    AlreadyReplaced,
    /// The attachment is itself a placeholder.
    Placeholder,
    /// Another worker changed the root pointer first.
    Contended,
}

pub struct Deduplicator {
    stores: Stores,
    registry: PlaceholderRegistry,
    batch_size: usize,
}

impl Deduplicator {
    pub fn new(stores: Stores, registry: PlaceholderRegistry) -> Self {
        Self {
            stores,
            registry,
            batch_size: defaults::REPLACE_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn registry(&self) -> &PlaceholderRegistry {
        &self.registry
    }

    /// Replace the content of every attachment in `ids`.
    ///
    /// Repeated ids are handled once. Batches are independent: a batch that
    /// fails is recorded in the report and the next batch still runs.
    pub async fn replace(&self, ids: &[Uuid]) -> ReplaceReport {
        let start = Instant::now();
        let mut report = ReplaceReport::default();
        let ids = dedup_preserving_order(ids.to_vec());

        for (index, batch) in ids.chunks(self.batch_size).enumerate() {
            if let Err(e) = self.replace_batch(batch, &mut report).await {
                error!(
                    subsystem = logging::DEDUP,
                    op = "batch",
                    batch = index,
                    size = batch.len(),
                    error = %e,
                    "Batch aborted"
                );
                report.failed_batches += 1;
                report.errors.push(format!("batch {}: {}", index, e));
            }
        }

        info!(
            subsystem = logging::DEDUP,
            op = "replace",
            candidates = ids.len(),
            replaced = report.replaced,
            repointed = report.repointed,
            already_replaced = report.already_replaced,
            skipped = report.skipped,
            demoted = report.demoted,
            failed_records = report.failed_records,
            failed_batches = report.failed_batches,
            duration_ms = start.elapsed().as_millis() as u64,
            "Replacement run complete"
        );
        report
    }

    async fn replace_batch(&self, ids: &[Uuid], report: &mut ReplaceReport) -> Result<()> {
        let mut batch = self.stores.attachments.fetch_many(ids).await?;

        let missing = ids.len().saturating_sub(batch.len()) as u64;
        if missing > 0 {
            debug!(subsystem = logging::DEDUP, missing, "Ids without rows skipped");
            report.skipped += missing;
        }

        // Children first: a root whose dependents are all in this batch
        // then needs no holder.
        batch.sort_by_key(Attachment::is_root);

        for att in batch {
            match self.replace_one(&att).await {
                Ok(outcome) => {
                    debug!(
                        subsystem = logging::DEDUP,
                        op = "record",
                        attachment_id = %att.id,
                        outcome = ?outcome,
                        "Processed attachment"
                    );
                    tally(report, outcome);
                }
                Err(e) if e.is_record_scoped() => {
                    warn!(
                        subsystem = logging::DEDUP,
                        op = "record",
                        attachment_id = %att.id,
                        error = %e,
                        "Attachment skipped"
                    );
                    report.failed_records += 1;
                    report.errors.push(format!("attachment {}: {}", att.id, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Move one attachment onto its placeholder.
    pub async fn replace_one(&self, att: &Attachment) -> Result<ReplaceOutcome> {
        let class = MediaClass::from_content_type(&att.content_type);
        let placeholder = self.registry.get(class).await?;
        let attachments = &self.stores.attachments;

        match att.root_attachment_id {
            Some(root) if root == placeholder.id => {
                if carries_placeholder(att, &placeholder, class) {
                    return Ok(ReplaceOutcome::AlreadyReplaced);
                }
                // Claimed by an earlier run that failed before saving. That
                // run may have stopped before demoting or purging, so finish
                // whatever the row still owns.
                let holder = demote(&self.stores, att).await?;
                let owned_bytes = self.stores.content.exists(att.id).await?;
                let mut updated = att.clone();
                if owned_bytes {
                    purge_content(&self.stores, att).await?;
                    updated.has_thumbnail = false;
                }
                apply_placeholder(&mut updated, &placeholder, class);
                attachments.update(&updated).await?;

                if holder.is_some() || owned_bytes {
                    warn!(
                        subsystem = logging::DEDUP,
                        op = "resume",
                        attachment_id = %att.id,
                        demoted = holder.is_some(),
                        "Finished an interrupted replacement"
                    );
                    Ok(ReplaceOutcome::Replaced {
                        demoted: holder.is_some(),
                    })
                } else {
                    Ok(ReplaceOutcome::Repointed)
                }
            }
            Some(old_root) => {
                if !attachments
                    .claim_root(att.id, Some(old_root), placeholder.id)
                    .await?
                {
                    return Ok(self.contended(att));
                }
                let mut updated = att.clone();
                apply_placeholder(&mut updated, &placeholder, class);
                attachments.update(&updated).await?;
                Ok(ReplaceOutcome::Repointed)
            }
            None => {
                if self.registry.key().matches(att) || self.registry.is_cached_placeholder(att.id) {
                    return Ok(ReplaceOutcome::Placeholder);
                }
                if !attachments.claim_root(att.id, None, placeholder.id).await? {
                    return Ok(self.contended(att));
                }

                let holder = demote(&self.stores, att).await?;
                purge_content(&self.stores, att).await?;

                let mut updated = att.clone();
                apply_placeholder(&mut updated, &placeholder, class);
                updated.has_thumbnail = false;
                attachments.update(&updated).await?;

                Ok(ReplaceOutcome::Replaced {
                    demoted: holder.is_some(),
                })
            }
        }
    }

    fn contended(&self, att: &Attachment) -> ReplaceOutcome {
        warn!(
            subsystem = logging::DEDUP,
            op = "claim",
            attachment_id = %att.id,
            "Root pointer changed underneath us, skipping"
        );
        ReplaceOutcome::Contended
    }
}

fn tally(report: &mut ReplaceReport, outcome: ReplaceOutcome) {
    match outcome {
        ReplaceOutcome::Replaced { demoted } => {
            report.replaced += 1;
            if demoted {
                report.demoted += 1;
            }
        }
        ReplaceOutcome::Repointed => report.repointed += 1,
        ReplaceOutcome::AlreadyReplaced => report.already_replaced += 1,
        ReplaceOutcome::Placeholder | ReplaceOutcome::Contended => report.skipped += 1,
    }
}

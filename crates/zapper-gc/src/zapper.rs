//! Run facade tying candidate collection to the engines.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use zapper_core::{logging, Result, RetentionPolicy, Term, TermIdentifier};

use crate::candidates::{CandidateCollector, SubmissionExtras};
use crate::dedup::Deduplicator;
use crate::disposer::Disposer;
use crate::placeholder::{PlaceholderAssets, PlaceholderKey, PlaceholderRegistry};
use crate::report::{DisposalReport, ReplaceReport, SweepReport};
use crate::Stores;

/// Entry point for every space reclamation run.
pub struct FileZapper {
    stores: Stores,
    dedup: Deduplicator,
    disposer: Disposer,
    candidates: CandidateCollector,
}

impl FileZapper {
    /// Validate `policy` and wire the engines.
    ///
    /// Placeholders are owned by the directory's default account.
    pub async fn new(
        stores: Stores,
        policy: RetentionPolicy,
        assets: PlaceholderAssets,
    ) -> Result<Self> {
        policy.validate(Utc::now())?;

        let owner = stores.directory.default_account().await?;
        let key = PlaceholderKey::new(owner, policy.placeholder_base_name.clone());
        let registry = PlaceholderRegistry::new(
            stores.attachments.clone(),
            stores.content.clone(),
            key.clone(),
            assets,
        );

        Ok(Self {
            dedup: Deduplicator::new(stores.clone(), registry),
            disposer: Disposer::new(stores.clone(), policy).protecting(key),
            candidates: CandidateCollector::new(
                stores.attachments.clone(),
                stores.directory.clone(),
            ),
            stores,
        })
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn disposer(&self) -> &Disposer {
        &self.disposer
    }

    /// Replace every available file in the term's courses and groups.
    pub async fn replace_course_files(&self, term: &TermIdentifier) -> Result<ReplaceReport> {
        let term = self.resolve(term).await?;
        let ids = self.candidates.course_files(&term).await?;
        Ok(self.dedup.replace(&ids).await)
    }

    /// Replace every submitted file in the term's courses.
    pub async fn replace_submissions(
        &self,
        term: &TermIdentifier,
        extras: SubmissionExtras,
    ) -> Result<ReplaceReport> {
        let term = self.resolve(term).await?;
        let ids = self.candidates.submissions(&term, extras).await?;
        Ok(self.dedup.replace(&ids).await)
    }

    /// Replace an explicit list of attachments.
    pub async fn replace_files(&self, ids: &[Uuid]) -> ReplaceReport {
        self.dedup.replace(ids).await
    }

    pub async fn delete_deleted_files(&self) -> SweepReport {
        self.disposer.delete_deleted_files().await
    }

    pub async fn delete_disposable_files(&self) -> DisposalReport {
        self.disposer.delete_disposable_files().await
    }

    async fn resolve(&self, identifier: &TermIdentifier) -> Result<Term> {
        let term = self.stores.terms.resolve_term(identifier).await?;
        info!(
            subsystem = logging::CANDIDATES,
            op = "resolve_term",
            term = %identifier,
            term_id = %term.id,
            courses = term.course_ids.len(),
            "Resolved term"
        );
        Ok(term)
    }
}

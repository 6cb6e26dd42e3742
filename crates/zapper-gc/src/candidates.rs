//! Candidate id collection for a term's courses.

use std::collections::HashSet;
use std::sync::Arc;

use futures::TryStreamExt;
use tracing::debug;
use uuid::Uuid;

use zapper_core::{
    defaults, logging, AttachmentFilter, AttachmentRepository, AttachmentState, ContextDirectory,
    ContextRef, Result, Term,
};

use crate::paging::keyset_pages;

/// Which attachments besides submission history count as submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionExtras {
    /// Attachments owned by the courses' assignments (comment files).
    pub comments: bool,
    /// Attachments owned by quiz submissions of the courses' quizzes.
    pub quizzes: bool,
}

impl Default for SubmissionExtras {
    fn default() -> Self {
        Self {
            comments: true,
            quizzes: true,
        }
    }
}

impl SubmissionExtras {
    /// Submission history only.
    pub fn none() -> Self {
        Self {
            comments: false,
            quizzes: false,
        }
    }
}

pub struct CandidateCollector {
    attachments: Arc<dyn AttachmentRepository>,
    directory: Arc<dyn ContextDirectory>,
    page_size: i64,
}

impl CandidateCollector {
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        directory: Arc<dyn ContextDirectory>,
    ) -> Self {
        Self {
            attachments,
            directory,
            page_size: defaults::SWEEP_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Available attachments owned by the term's courses or their groups.
    pub async fn course_files(&self, term: &Term) -> Result<Vec<Uuid>> {
        let mut contexts = term.course_contexts();
        contexts.extend(self.directory.group_contexts(&term.course_ids).await?);

        let filter = AttachmentFilter::new()
            .in_contexts(contexts)
            .with_state(AttachmentState::Available);
        let ids = self.ids_matching(filter).await?;

        debug!(
            subsystem = logging::CANDIDATES,
            op = "course_files",
            term_id = %term.id,
            courses = term.course_ids.len(),
            candidates = ids.len(),
            "Collected course file candidates"
        );
        Ok(ids)
    }

    /// Attachments submitted to the term's assignments, plus the extras.
    ///
    /// Ids keep the order they were first seen in.
    pub async fn submissions(&self, term: &Term, extras: SubmissionExtras) -> Result<Vec<Uuid>> {
        let mut ids = self
            .directory
            .submission_history_attachment_ids(&term.course_ids)
            .await?;

        if extras.comments {
            let assignments = self.directory.assignment_contexts(&term.course_ids).await?;
            ids.extend(
                self.ids_in(assignments, &[AttachmentState::Zipped, AttachmentState::Hidden])
                    .await?,
            );
        }
        if extras.quizzes {
            let quiz_submissions = self
                .directory
                .quiz_submission_contexts(&term.course_ids)
                .await?;
            ids.extend(self.ids_in(quiz_submissions, &[AttachmentState::Hidden]).await?);
        }

        let ids = dedup_preserving_order(ids);
        debug!(
            subsystem = logging::CANDIDATES,
            op = "submissions",
            term_id = %term.id,
            comments = extras.comments,
            quizzes = extras.quizzes,
            candidates = ids.len(),
            "Collected submission candidates"
        );
        Ok(ids)
    }

    /// Ids in `contexts`, minus rows in any of the `excluding` states.
    ///
    /// Hidden rows are byte holders left by earlier demotions; they are never
    /// submissions themselves.
    async fn ids_in(
        &self,
        contexts: Vec<ContextRef>,
        excluding: &[AttachmentState],
    ) -> Result<Vec<Uuid>> {
        if contexts.is_empty() {
            return Ok(Vec::new());
        }
        let filter = excluding
            .iter()
            .fold(AttachmentFilter::new().in_contexts(contexts), |filter, state| {
                filter.without_state(*state)
            });
        self.ids_matching(filter).await
    }

    async fn ids_matching(&self, filter: AttachmentFilter) -> Result<Vec<Uuid>> {
        let attachments = self.attachments.clone();
        let limit = self.page_size;
        let pages = keyset_pages(limit, move |after| {
            let attachments = attachments.clone();
            let filter = filter.clone();
            async move { attachments.find_page(&filter, after, limit).await }
        });
        pages
            .map_ok(|page| page.into_iter().map(|a| a.id).collect::<Vec<_>>())
            .try_concat()
            .await
    }
}

pub(crate) fn dedup_preserving_order(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

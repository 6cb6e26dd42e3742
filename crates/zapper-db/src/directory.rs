//! Term resolution and organisational lookups.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use zapper_core::{
    ContextDirectory, ContextKind, ContextRef, Error, Result, Term, TermIdentifier, TermResolver,
};

/// PostgreSQL implementation of TermResolver and ContextDirectory.
pub struct PgContextDirectory {
    pool: PgPool,
}

impl PgContextDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn id_column(&self, sql: &str, course_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(sql)
            .bind(course_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

#[async_trait]
impl TermResolver for PgContextDirectory {
    async fn resolve_term(&self, identifier: &TermIdentifier) -> Result<Term> {
        let row = match identifier {
            TermIdentifier::Id(id) => {
                sqlx::query("SELECT id, name, sis_source_id FROM enrollment_term WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            TermIdentifier::SisSourceId(sis) => {
                sqlx::query(
                    "SELECT id, name, sis_source_id FROM enrollment_term WHERE sis_source_id = $1",
                )
                .bind(sis)
                .fetch_optional(&self.pool)
                .await?
            }
        }
        .ok_or_else(|| Error::UnresolvedTerm(identifier.to_string()))?;

        let term_id: Uuid = row.get("id");
        let course_ids = sqlx::query("SELECT id FROM course WHERE enrollment_term_id = $1 ORDER BY id")
            .bind(term_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();

        Ok(Term {
            id: term_id,
            name: row.get("name"),
            sis_source_id: row.get("sis_source_id"),
            course_ids,
        })
    }
}

#[async_trait]
impl ContextDirectory for PgContextDirectory {
    async fn default_account(&self) -> Result<ContextRef> {
        let row = sqlx::query("SELECT id FROM account WHERE is_default ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("default account".into()))?;
        Ok(ContextRef::account(row.get("id")))
    }

    async fn group_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>> {
        let ids = self
            .id_column(
                "SELECT id FROM course_group WHERE course_id = ANY($1::uuid[]) ORDER BY id",
                course_ids,
            )
            .await?;
        Ok(ids
            .into_iter()
            .map(|id| ContextRef::new(ContextKind::Group, id))
            .collect())
    }

    async fn assignment_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>> {
        let ids = self
            .id_column(
                "SELECT id FROM assignment WHERE course_id = ANY($1::uuid[]) ORDER BY id",
                course_ids,
            )
            .await?;
        Ok(ids.into_iter().map(ContextRef::assignment).collect())
    }

    async fn quiz_submission_contexts(&self, course_ids: &[Uuid]) -> Result<Vec<ContextRef>> {
        let ids = self
            .id_column(
                r#"SELECT qs.id FROM quiz_submission qs
                   JOIN quiz q ON q.id = qs.quiz_id
                   WHERE q.course_id = ANY($1::uuid[])
                   ORDER BY qs.id"#,
                course_ids,
            )
            .await?;
        Ok(ids
            .into_iter()
            .map(|id| ContextRef::new(ContextKind::QuizSubmission, id))
            .collect())
    }

    async fn submission_history_attachment_ids(&self, course_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        self.id_column(
            r#"SELECT UNNEST(sv.attachment_ids) AS id
               FROM submission_version sv
               JOIN submission s ON s.id = sv.submission_id
               JOIN assignment asg ON asg.id = s.assignment_id
               WHERE asg.course_id = ANY($1::uuid[])
               ORDER BY sv.id"#,
            course_ids,
        )
        .await
    }
}

//! Artifact family repository: content exports, epub exports, content
//! migrations and SIS batches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use zapper_core::{
    ArtifactRepository, ContentExport, ContentMigration, ContextRef, EpubExport, Error, Result,
    SisBatch, StoreOutcome,
};

use crate::outcome::delete_outcome;

/// PostgreSQL implementation of ArtifactRepository.
pub struct PgArtifactRepository {
    pool: PgPool,
}

impl PgArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactRepository for PgArtifactRepository {
    async fn content_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ContentExport>> {
        sqlx::query(
            r#"SELECT id, context_type, context_id, attachment_id, content_migration_id,
                      workflow_state, created_at
               FROM content_export
               WHERE created_at < $1
                 AND workflow_state <> 'deleted'
                 AND ($2::uuid IS NULL OR id > $2)
               ORDER BY id
               LIMIT $3"#,
        )
        .bind(cutoff)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(content_export_from_row)
        .collect()
    }

    async fn get_content_export(&self, id: Uuid) -> Result<Option<ContentExport>> {
        sqlx::query(
            r#"SELECT id, context_type, context_id, attachment_id, content_migration_id,
                      workflow_state, created_at
               FROM content_export WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| content_export_from_row(&row))
        .transpose()
    }

    async fn content_exports_for_migration(
        &self,
        migration_id: Uuid,
    ) -> Result<Vec<ContentExport>> {
        sqlx::query(
            r#"SELECT id, context_type, context_id, attachment_id, content_migration_id,
                      workflow_state, created_at
               FROM content_export WHERE content_migration_id = $1
               ORDER BY id"#,
        )
        .bind(migration_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(content_export_from_row)
        .collect()
    }

    async fn mark_content_export_deleted(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE content_export SET workflow_state = 'deleted', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content export {}", id)));
        }
        Ok(())
    }

    async fn delete_content_export(&self, id: Uuid) -> Result<StoreOutcome> {
        delete_outcome(
            sqlx::query("DELETE FROM content_export WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await,
        )
    }

    async fn epub_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<EpubExport>> {
        let rows = sqlx::query(
            r#"SELECT id, course_id, content_export_id, workflow_state, created_at
               FROM epub_export
               WHERE created_at < $1 AND ($2::uuid IS NULL OR id > $2)
               ORDER BY id
               LIMIT $3"#,
        )
        .bind(cutoff)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EpubExport {
                id: row.get("id"),
                course_id: row.get("course_id"),
                content_export_id: row.get("content_export_id"),
                workflow_state: row.get("workflow_state"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete_epub_export(&self, id: Uuid) -> Result<StoreOutcome> {
        delete_outcome(
            sqlx::query("DELETE FROM epub_export WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await,
        )
    }

    async fn content_migrations_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ContentMigration>> {
        sqlx::query(
            r#"SELECT id, context_type, context_id, attachment_id, overview_attachment_id,
                      exported_attachment_id, workflow_state, created_at
               FROM content_migration
               WHERE created_at < $1 AND ($2::uuid IS NULL OR id > $2)
               ORDER BY id
               LIMIT $3"#,
        )
        .bind(cutoff)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(ContentMigration {
                id: row.get("id"),
                context: context_from_row(row)?,
                attachment_id: row.get("attachment_id"),
                overview_attachment_id: row.get("overview_attachment_id"),
                exported_attachment_id: row.get("exported_attachment_id"),
                workflow_state: row.get("workflow_state"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
    }

    async fn delete_content_migration(&self, id: Uuid) -> Result<StoreOutcome> {
        delete_outcome(
            sqlx::query("DELETE FROM content_migration WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await,
        )
    }

    async fn sis_batches_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SisBatch>> {
        let rows = sqlx::query(
            r#"SELECT id, account_id, workflow_state, created_at
               FROM sis_batch
               WHERE created_at < $1 AND ($2::uuid IS NULL OR id > $2)
               ORDER BY id
               LIMIT $3"#,
        )
        .bind(cutoff)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SisBatch {
                id: row.get("id"),
                account_id: row.get("account_id"),
                workflow_state: row.get("workflow_state"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete_sis_batch(&self, id: Uuid) -> Result<StoreOutcome> {
        delete_outcome(
            sqlx::query("DELETE FROM sis_batch WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await,
        )
    }

    async fn decrement_submission_downloads(&self, assignment_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"UPDATE assignment
               SET submissions_downloads = GREATEST(submissions_downloads - 1, 0)
               WHERE id = $1"#,
        )
        .bind(assignment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn context_from_row(row: &sqlx::postgres::PgRow) -> Result<ContextRef> {
    let context_type: String = row.get("context_type");
    Ok(ContextRef::new(
        context_type.parse().map_err(Error::Serialization)?,
        row.get("context_id"),
    ))
}

fn content_export_from_row(row: &sqlx::postgres::PgRow) -> Result<ContentExport> {
    let state: String = row.get("workflow_state");
    Ok(ContentExport {
        id: row.get("id"),
        context: context_from_row(row)?,
        attachment_id: row.get("attachment_id"),
        content_migration_id: row.get("content_migration_id"),
        workflow_state: state.parse().map_err(Error::Serialization)?,
        created_at: row.get("created_at"),
    })
}

//! Attachment repository implementation.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use zapper_core::{
    Attachment, AttachmentFilter, AttachmentRepository, ContextRef, Error, NewAttachment, Result,
    StoreOutcome,
};

use crate::attachment_filter::{AttachmentFilterQueryBuilder, QueryParam};
use crate::outcome::{delete_outcome, write_error};

const ATTACHMENT_COLUMNS: &str = "a.id, a.context_type, a.context_id, a.root_attachment_id, \
     a.filename, a.display_name, a.content_type, a.content_hash, a.size_bytes, \
     a.state, a.has_thumbnail, a.created_at, a.updated_at, a.deleted_at";

/// PostgreSQL implementation of AttachmentRepository.
pub struct PgAttachmentRepository {
    pool: PgPool,
}

impl PgAttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Attachment>> {
        let sql = format!("SELECT {} FROM attachment a WHERE a.id = $1", ATTACHMENT_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| attachment_from_row(&row))
            .transpose()
    }

    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM attachment a WHERE a.id = ANY($1::uuid[]) ORDER BY a.id",
            ATTACHMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(attachment_from_row)
            .collect()
    }

    async fn find_page(
        &self,
        filter: &AttachmentFilter,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Attachment>> {
        let (where_clause, params) = AttachmentFilterQueryBuilder::new(filter, 0).build();
        let after_idx = params.len() + 1;
        let sql = format!(
            "SELECT {} FROM attachment a \
             WHERE {} AND (${}::uuid IS NULL OR a.id > ${}) \
             ORDER BY a.id LIMIT ${}",
            ATTACHMENT_COLUMNS,
            where_clause,
            after_idx,
            after_idx,
            after_idx + 1
        );

        let mut q = sqlx::query(&sql);
        for param in params {
            q = match param {
                QueryParam::Uuid(id) => q.bind(id),
                QueryParam::UuidArray(ids) => q.bind(ids),
                QueryParam::Timestamp(ts) => q.bind(ts),
                QueryParam::String(s) => q.bind(s),
                QueryParam::StringArray(arr) => q.bind(arr),
            };
        }
        q = q.bind(after).bind(limit);

        q.fetch_all(&self.pool)
            .await?
            .iter()
            .map(attachment_from_row)
            .collect()
    }

    async fn find_root_by_filename(
        &self,
        filename: &str,
        context: &ContextRef,
    ) -> Result<Option<Attachment>> {
        let sql = format!(
            "SELECT {} FROM attachment a \
             WHERE a.filename = $1 AND a.context_type = $2 AND a.context_id = $3 \
               AND a.root_attachment_id IS NULL \
             ORDER BY a.id LIMIT 1",
            ATTACHMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(filename)
            .bind(context.kind.as_str())
            .bind(context.id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| attachment_from_row(&row))
            .transpose()
    }

    async fn insert(&self, req: NewAttachment) -> Result<Attachment> {
        let sql = format!(
            "INSERT INTO attachment AS a \
               (id, context_type, context_id, root_attachment_id, filename, display_name, \
                content_type, content_hash, size_bytes, state) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {}",
            ATTACHMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(req.id)
            .bind(req.context.kind.as_str())
            .bind(req.context.id)
            .bind(req.root_attachment_id)
            .bind(&req.filename)
            .bind(&req.display_name)
            .bind(&req.content_type)
            .bind(&req.content_hash)
            .bind(req.size_bytes)
            .bind(req.state.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;
        attachment_from_row(&row)
    }

    async fn update(&self, attachment: &Attachment) -> Result<()> {
        attachment.validate()?;
        let result = sqlx::query(
            r#"UPDATE attachment
               SET root_attachment_id = $2, filename = $3, display_name = $4,
                   content_type = $5, content_hash = $6, size_bytes = $7,
                   state = $8, has_thumbnail = $9, deleted_at = $10, updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(attachment.id)
        .bind(attachment.root_attachment_id)
        .bind(&attachment.filename)
        .bind(&attachment.display_name)
        .bind(&attachment.content_type)
        .bind(&attachment.content_hash)
        .bind(attachment.size_bytes)
        .bind(attachment.state.to_string())
        .bind(attachment.has_thumbnail)
        .bind(attachment.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(Error::AttachmentNotFound(attachment.id));
        }
        Ok(())
    }

    async fn claim_root(&self, id: Uuid, expected: Option<Uuid>, new_root: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET root_attachment_id = $3, updated_at = NOW()
               WHERE id = $1 AND root_attachment_id IS NOT DISTINCT FROM $2"#,
        )
        .bind(id)
        .bind(expected)
        .bind(new_root)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reparent_children(&self, from: Uuid, to: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET root_attachment_id = $2, updated_at = NOW()
               WHERE root_attachment_id = $1 AND id <> $2"#,
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_children(&self, id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM attachment WHERE root_attachment_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn soft_delete(&self, id: Uuid) -> Result<StoreOutcome> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET state = 'deleted', deleted_at = NOW(), updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(if result.rows_affected() == 0 {
            StoreOutcome::NotFound
        } else {
            StoreOutcome::Done
        })
    }

    async fn hard_delete(&self, id: Uuid) -> Result<StoreOutcome> {
        delete_outcome(
            sqlx::query("DELETE FROM attachment WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await,
        )
    }
}

pub(crate) fn attachment_from_row(row: &sqlx::postgres::PgRow) -> Result<Attachment> {
    let context_type: String = row.get("context_type");
    let state: String = row.get("state");
    Ok(Attachment {
        id: row.get("id"),
        context: ContextRef::new(
            context_type.parse().map_err(Error::Serialization)?,
            row.get("context_id"),
        ),
        root_attachment_id: row.get("root_attachment_id"),
        filename: row.get("filename"),
        display_name: row.get("display_name"),
        content_type: row.get("content_type"),
        content_hash: row.get("content_hash"),
        size_bytes: row.get("size_bytes"),
        state: state.parse().map_err(Error::Serialization)?,
        has_thumbnail: row.get("has_thumbnail"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

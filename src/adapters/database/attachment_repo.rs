use crate::adapters::database::DbPool;
use crate::adapters::database::records::AttachmentRecord;
use crate::domain::attachment::{Attachment, NewAttachment};
use crate::error::MetadataError;
use async_trait::async_trait;
use std::fmt::Debug;
use time::OffsetDateTime;
use uuid::Uuid;

const COLUMNS: &str = "id, storage_key, url, file_name, mime_type, size_bytes, status, created_at, updated_at";

/// Persistence for attachment records.
#[async_trait]
pub trait AttachmentRepository: Debug + Send + Sync + 'static {
    /// Inserts a `Pending` record without a URL.
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment, MetadataError>;

    /// Sets the URL and marks the record `Complete`.
    ///
    /// Fails with `MetadataError::NotFound` when the row is gone, so a deleted record is never
    /// recreated by a late finalization.
    async fn complete(&self, id: Uuid, url: &str) -> Result<Attachment, MetadataError>;

    /// Marks a record `Failed` so the reaper collects it.
    async fn mark_failed(&self, id: Uuid) -> Result<(), MetadataError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, MetadataError>;

    async fn delete(&self, id: Uuid) -> Result<(), MetadataError>;

    /// Returns `Failed` records and `Pending` records created before `pending_before`, oldest first.
    async fn fetch_stale(&self, pending_before: OffsetDateTime, limit: i64) -> Result<Vec<Attachment>, MetadataError>;
}

#[derive(Clone, Debug)]
pub struct PgAttachmentRepository {
    pool: DbPool,
}

impl PgAttachmentRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    #[tracing::instrument(level = "debug", skip(self, attachment), fields(attachment_id = %attachment.id))]
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment, MetadataError> {
        let record = sqlx::query_as::<_, AttachmentRecord>(&format!(
            "INSERT INTO attachments (id, storage_key, file_name, mime_type, size_bytes, status)
             VALUES ($1, $2, $3, $4, $5, 'pending')
             RETURNING {COLUMNS}"
        ))
        .bind(attachment.id)
        .bind(&attachment.key)
        .bind(&attachment.file_name)
        .bind(&attachment.mime_type)
        .bind(attachment.size_bytes)
        .fetch_one(&self.pool)
        .await?;

        record.try_into()
    }

    #[tracing::instrument(level = "debug", skip(self, url))]
    async fn complete(&self, id: Uuid, url: &str) -> Result<Attachment, MetadataError> {
        let record = sqlx::query_as::<_, AttachmentRecord>(&format!(
            "UPDATE attachments SET url = $2, status = 'complete', updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or(MetadataError::NotFound)?.try_into()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn mark_failed(&self, id: Uuid) -> Result<(), MetadataError> {
        let result = sqlx::query("UPDATE attachments SET status = 'failed', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, MetadataError> {
        let record = sqlx::query_as::<_, AttachmentRecord>(&format!("SELECT {COLUMNS} FROM attachments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(TryInto::try_into).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), MetadataError> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = $1").bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_stale(&self, pending_before: OffsetDateTime, limit: i64) -> Result<Vec<Attachment>, MetadataError> {
        let records = sqlx::query_as::<_, AttachmentRecord>(&format!(
            "SELECT {COLUMNS} FROM attachments
             WHERE status = 'failed' OR (status = 'pending' AND created_at < $1)
             ORDER BY created_at
             LIMIT $2"
        ))
        .bind(pending_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }
}

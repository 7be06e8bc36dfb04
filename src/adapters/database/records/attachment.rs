use crate::domain::attachment::Attachment;
use crate::error::MetadataError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AttachmentRecord {
    pub(crate) id: Uuid,
    pub(crate) storage_key: String,
    pub(crate) url: Option<String>,
    pub(crate) file_name: String,
    pub(crate) mime_type: String,
    pub(crate) size_bytes: i64,
    pub(crate) status: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<AttachmentRecord> for Attachment {
    type Error = MetadataError;

    fn try_from(record: AttachmentRecord) -> Result<Self, Self::Error> {
        let status = record.status.parse().map_err(|e| MetadataError::Database(sqlx::Error::Decode(Box::new(e))))?;
        Ok(Self {
            id: record.id,
            key: record.storage_key,
            url: record.url,
            file_name: record.file_name,
            mime_type: record.mime_type,
            size_bytes: record.size_bytes,
            status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

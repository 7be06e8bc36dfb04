use crate::adapters::database::attachment_repo::AttachmentRepository;
use crate::domain::attachment::{Attachment, AttachmentStatus, NewAttachment};
use crate::error::MetadataError;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Process-local attachment records for tests and local development.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAttachmentRepository {
    records: Arc<DashMap<Uuid, Attachment>>,
}

impl InMemoryAttachmentRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts a record as-is, bypassing the pending lifecycle.
    pub fn insert(&self, attachment: Attachment) {
        self.records.insert(attachment.id, attachment);
    }
}

#[async_trait]
impl AttachmentRepository for InMemoryAttachmentRepository {
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment, MetadataError> {
        if self.records.iter().any(|r| r.key == attachment.key) {
            return Err(MetadataError::Backend(format!("duplicate storage key {}", attachment.key)));
        }

        let now = OffsetDateTime::now_utc();
        let record = Attachment {
            id: attachment.id,
            key: attachment.key,
            url: None,
            file_name: attachment.file_name,
            mime_type: attachment.mime_type,
            size_bytes: attachment.size_bytes,
            status: AttachmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(MetadataError::Backend(format!("duplicate id {}", record.id))),
            Entry::Vacant(entry) => Ok(entry.insert(record).clone()),
        }
    }

    async fn complete(&self, id: Uuid, url: &str) -> Result<Attachment, MetadataError> {
        let mut record = self.records.get_mut(&id).ok_or(MetadataError::NotFound)?;
        record.url = Some(url.to_string());
        record.status = AttachmentStatus::Complete;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), MetadataError> {
        let mut record = self.records.get_mut(&id).ok_or(MetadataError::NotFound)?;
        record.status = AttachmentStatus::Failed;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, MetadataError> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), MetadataError> {
        self.records.remove(&id).map(|_| ()).ok_or(MetadataError::NotFound)
    }

    async fn fetch_stale(&self, pending_before: OffsetDateTime, limit: i64) -> Result<Vec<Attachment>, MetadataError> {
        let mut stale: Vec<Attachment> = self
            .records
            .iter()
            .filter(|r| match r.status {
                AttachmentStatus::Failed => true,
                AttachmentStatus::Pending => r.created_at < pending_before,
                AttachmentStatus::Complete => false,
            })
            .map(|r| r.clone())
            .collect();

        stale.sort_by_key(|r| r.created_at);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }
}

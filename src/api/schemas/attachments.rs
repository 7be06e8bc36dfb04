use crate::domain::attachment::Attachment;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub key: String,
    pub url: Option<String>,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Attachment> for AttachmentResponse {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            key: attachment.key,
            url: attachment.url,
            file_name: attachment.file_name,
            mime_type: attachment.mime_type,
            size_bytes: attachment.size_bytes,
            status: attachment.status.as_str().to_string(),
            created_at: attachment.created_at.unix_timestamp(),
            updated_at: attachment.updated_at.unix_timestamp(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAttachmentRequest {
    #[serde(default)]
    pub attachment_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAttachmentResponse {
    pub success: bool,
    pub message: String,
}

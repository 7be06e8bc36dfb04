use crate::error::ValidationError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Namespace under which uploaded objects are stored.
pub const DEFAULT_KEY_PREFIX: &str = "attachments/anonymous";

const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentStatus {
    /// Record exists, object transfer not yet confirmed.
    Pending,
    /// Object stored and public URL recorded.
    Complete,
    /// Compensation could not remove the record; garbage for the reaper.
    Failed,
}

impl AttachmentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown attachment status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for AttachmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: Uuid,
    pub key: String,
    pub url: Option<String>,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: AttachmentStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Attachment {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == AttachmentStatus::Complete && self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Whether the reaper may collect this record.
    ///
    /// `Failed` records are always collectable. `Pending` records become collectable once they
    /// are older than `grace`, which is the window a caller has to retry finalization.
    #[must_use]
    pub fn is_stale_at(&self, now: OffsetDateTime, grace: Duration) -> bool {
        match self.status {
            AttachmentStatus::Failed => true,
            AttachmentStatus::Pending => self.created_at + grace < now,
            AttachmentStatus::Complete => false,
        }
    }
}

/// Fields supplied when a pending record is first created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub id: Uuid,
    pub key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

/// A client upload. Name and MIME type are untrusted.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

impl UploadRequest {
    pub fn new(bytes: impl Into<Bytes>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), file_name: file_name.into(), mime_type: mime_type.into() }
    }

    /// Checks presence, size and declared type, in that order.
    ///
    /// # Errors
    /// Returns the first `ValidationError` encountered.
    pub fn validate(&self, max_size_bytes: usize) -> Result<(), ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::MissingFile);
        }
        if self.bytes.len() > max_size_bytes {
            return Err(ValidationError::TooLarge { limit: max_size_bytes });
        }
        if !self.mime_type.starts_with("image/") {
            return Err(ValidationError::UnsupportedMediaType(self.mime_type.clone()));
        }
        Ok(())
    }
}

/// Extension of a client-supplied file name, if it looks like one.
///
/// Only 1 to 16 ASCII alphanumeric characters after the last dot are accepted; the result is
/// lowercased.
#[must_use]
pub fn file_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > MAX_EXTENSION_LEN || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Builds the object key `{prefix}/{object_id}.{ext}`.
#[must_use]
pub fn storage_key(prefix: &str, object_id: Uuid, file_name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = match file_extension(file_name) {
        Some(ext) => format!("{object_id}.{ext}"),
        None => object_id.to_string(),
    };
    if prefix.is_empty() { name } else { format!("{prefix}/{name}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(status: AttachmentStatus, age: Duration) -> Attachment {
        let now = OffsetDateTime::now_utc();
        Attachment {
            id: Uuid::new_v4(),
            key: "attachments/anonymous/a.png".to_string(),
            url: None,
            file_name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 3,
            status,
            created_at: now - age,
            updated_at: now - age,
        }
    }

    #[test]
    fn test_storage_key_keeps_extension() {
        let id = Uuid::new_v4();
        assert_eq!(storage_key("attachments/anonymous", id, "Holiday.JPG"), format!("attachments/anonymous/{id}.jpg"));
    }

    #[test]
    fn test_storage_key_without_extension() {
        let id = Uuid::new_v4();
        assert_eq!(storage_key("attachments/anonymous/", id, "photo"), format!("attachments/anonymous/{id}"));
        assert_eq!(storage_key("", id, "photo."), id.to_string());
    }

    #[test]
    fn test_file_extension_rejects_suspicious_suffixes() {
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension(".png").as_deref(), Some("png"));
        assert_eq!(file_extension("evil.png/../../x"), None);
        assert_eq!(file_extension("weird.p n g"), None);
        assert_eq!(file_extension("long.abcdefghijklmnopq"), None);
    }

    #[test]
    fn test_validate_order() {
        let empty = UploadRequest::new(Bytes::new(), "a.png", "application/pdf");
        assert_eq!(empty.validate(10), Err(ValidationError::MissingFile));

        let big = UploadRequest::new(vec![0u8; 11], "a.png", "application/pdf");
        assert_eq!(big.validate(10), Err(ValidationError::TooLarge { limit: 10 }));

        let pdf = UploadRequest::new(vec![0u8; 10], "a.pdf", "application/pdf");
        assert_eq!(pdf.validate(10), Err(ValidationError::UnsupportedMediaType("application/pdf".to_string())));

        let png = UploadRequest::new(vec![0u8; 10], "a.png", "image/png");
        assert_eq!(png.validate(10), Ok(()));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [AttachmentStatus::Pending, AttachmentStatus::Complete, AttachmentStatus::Failed] {
            assert_eq!(status.as_str().parse::<AttachmentStatus>().ok(), Some(status));
        }
        assert!("done".parse::<AttachmentStatus>().is_err());
    }

    #[test]
    fn test_staleness() {
        let now = OffsetDateTime::now_utc();
        let grace = Duration::hours(1);

        assert!(attachment(AttachmentStatus::Failed, Duration::ZERO).is_stale_at(now, grace));
        assert!(attachment(AttachmentStatus::Pending, Duration::hours(2)).is_stale_at(now, grace));
        assert!(!attachment(AttachmentStatus::Pending, Duration::minutes(5)).is_stale_at(now, grace));
        assert!(!attachment(AttachmentStatus::Complete, Duration::days(30)).is_stale_at(now, grace));
    }
}

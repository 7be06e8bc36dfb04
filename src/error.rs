use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tokio::time::error::Elapsed;
use uuid::Uuid;

/// Rejections raised before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is required")]
    MissingFile,
    #[error("File size exceeds the limit of {limit} bytes")]
    TooLarge { limit: usize },
    #[error("File type '{0}' is not an image")]
    UnsupportedMediaType(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found")]
    NotFound,
    #[error("Object already exists")]
    AlreadyExists,
    #[error("Object stored but no public URL could be issued")]
    UrlUnavailable,
    #[error("Object store call timed out")]
    Timeout,
    #[error("Object store failure: {0}")]
    Backend(String),
}

impl From<Elapsed> for StorageError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Record not found")]
    NotFound,
    #[error("Metadata store call timed out")]
    Timeout,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Metadata store failure: {0}")]
    Backend(String),
}

impl From<Elapsed> for MetadataError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

/// A resource that a failed compensation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leftover {
    Object { key: String },
    Record { id: Uuid },
}

impl fmt::Display for Leftover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object { key } => write!(f, "object {key}"),
            Self::Record { id } => write!(f, "record {id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Metadata store error: {0}")]
    MetadataStore(#[source] MetadataError),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] StorageError),
    /// The object is stored and retrievable under `key`, but the record was not marked complete.
    #[error("Upload of {key} completed but record {id} could not be finalized: {source}")]
    Finalization {
        id: Uuid,
        key: String,
        #[source]
        source: MetadataError,
    },
    #[error("{cause}; cleanup left {} resource(s) behind", .leftovers.len())]
    Orphaned { cause: Box<AppError>, leftovers: Vec<Leftover> },
    #[error("Internal server error")]
    Internal,
}

impl From<MetadataError> for AppError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound => Self::NotFound,
            other => Self::MetadataStore(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Outcome label used for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::MetadataStore(_) => "metadata_store",
            Self::ObjectStore(_) => "object_store",
            Self::Finalization { .. } => "finalization",
            Self::Orphaned { .. } => "orphaned",
            Self::Internal => "internal",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(ValidationError::MissingFile) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(ValidationError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Validation(ValidationError::UnsupportedMediaType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::MetadataStore(_)
            | Self::ObjectStore(_)
            | Self::Finalization { .. }
            | Self::Orphaned { .. }
            | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            Self::Validation(e) => {
                tracing::debug!(error = %e, "Upload rejected");
                (e.to_string(), None)
            }
            Self::NotFound => {
                tracing::debug!("Attachment not found");
                ("Attachment not found".to_string(), None)
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (msg.clone(), None)
            }
            Self::Conflict(msg) => {
                tracing::debug!(message = %msg, "Conflict");
                (msg.clone(), None)
            }
            Self::MetadataStore(e) => {
                tracing::error!(error = %e, "Metadata store error");
                ("Failed to update attachment record.".to_string(), Some(e.to_string()))
            }
            Self::ObjectStore(StorageError::UrlUnavailable) => {
                tracing::error!("Public URL unavailable");
                ("File uploaded but failed to retrieve URL. Upload reverted.".to_string(), None)
            }
            Self::ObjectStore(e) => {
                tracing::error!(error = %e, "Object store error");
                ("Failed to access file storage.".to_string(), Some(e.to_string()))
            }
            Self::Finalization { id, key, source } => {
                tracing::error!(attachment_id = %id, key = %key, error = %source, "Finalization failed");
                ("Upload complete but failed to finalize record.".to_string(), Some(format!("attachment {id}: {source}")))
            }
            Self::Orphaned { cause, leftovers } => {
                tracing::error!(error = %cause, leftovers = leftovers.len(), "Cleanup incomplete");
                let left: Vec<String> = leftovers.iter().map(ToString::to_string).collect();
                (cause.to_string(), Some(format!("cleanup incomplete: {}", left.join(", "))))
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                ("Internal server error".to_string(), None)
            }
        };

        let body = match details {
            Some(details) => json!({ "error": message, "details": details }),
            None => json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation(ValidationError::MissingFile), StatusCode::BAD_REQUEST),
            (AppError::Validation(ValidationError::TooLarge { limit: 1 }), StatusCode::PAYLOAD_TOO_LARGE),
            (
                AppError::Validation(ValidationError::UnsupportedMediaType("application/pdf".into())),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::Conflict("abandoned".into()), StatusCode::CONFLICT),
            (AppError::ObjectStore(StorageError::Timeout), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppError::Finalization { id: Uuid::new_v4(), key: "k".into(), source: MetadataError::Timeout },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_metadata_not_found_maps_to_not_found() {
        assert!(matches!(AppError::from(MetadataError::NotFound), AppError::NotFound));
        assert!(matches!(AppError::from(MetadataError::Timeout), AppError::MetadataStore(MetadataError::Timeout)));
    }

    #[test]
    fn test_orphaned_message_counts_leftovers() {
        let error = AppError::Orphaned {
            cause: Box::new(AppError::ObjectStore(StorageError::Backend("boom".into()))),
            leftovers: vec![Leftover::Object { key: "a".into() }, Leftover::Record { id: Uuid::nil() }],
        };
        assert!(error.to_string().ends_with("cleanup left 2 resource(s) behind"));
    }
}

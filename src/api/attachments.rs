use crate::api::AppState;
use crate::api::schemas::attachments::{AttachmentResponse, DeleteAttachmentRequest, DeleteAttachmentResponse};
use crate::domain::attachment::UploadRequest;
use crate::error::{AppError, Result, ValidationError};
use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

const FILE_FIELD: &str = "file";

/// Uploads an image from the multipart field `file`.
///
/// # Errors
/// Returns `AppError::Validation` for a missing, oversize or non-image file, and the
/// coordinator's error if storing fails.
pub async fn upload_attachment(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse> {
    let limit = state.attachment_service.max_size_bytes();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(&e, limit))? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(&e, limit))?;

        upload = Some(UploadRequest { bytes, file_name, mime_type });
        break;
    }

    let request = upload.ok_or(ValidationError::MissingFile)?;
    let attachment = state.attachment_service.upload(request).await?;

    Ok((StatusCode::CREATED, Json(AttachmentResponse::from(attachment))))
}

/// Deletes an attachment named by `{"attachmentId": ...}`.
///
/// # Errors
/// Returns `AppError::BadRequest` for a missing or malformed id and `AppError::NotFound` if the
/// attachment does not exist.
pub async fn delete_attachment(
    State(state): State<AppState>,
    payload: std::result::Result<Json<DeleteAttachmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let id = body
        .attachment_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| AppError::BadRequest("Valid Attachment ID is required".into()))?;

    state.attachment_service.delete(id).await?;

    Ok(Json(DeleteAttachmentResponse { success: true, message: "Attachment deleted successfully".to_string() }))
}

/// Returns an attachment record.
///
/// # Errors
/// Returns `AppError::BadRequest` for a malformed id and `AppError::NotFound` if the attachment
/// does not exist.
pub async fn get_attachment(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = attachment_id(path)?;
    let attachment = state.attachment_service.get(id).await?;
    Ok(Json(AttachmentResponse::from(attachment)))
}

/// Retries finalization of an upload whose object is stored but whose record is still pending.
///
/// # Errors
/// Returns `AppError::BadRequest` for a malformed id, otherwise the coordinator's error if the
/// record cannot be completed.
pub async fn finalize_attachment(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let id = attachment_id(path)?;
    let attachment = state.attachment_service.finalize(id).await?;
    Ok(Json(AttachmentResponse::from(attachment)))
}

fn attachment_id(path: std::result::Result<Path<Uuid>, PathRejection>) -> Result<Uuid> {
    let Path(id) = path.map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(id)
}

fn multipart_error(e: &MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ValidationError::TooLarge { limit }.into();
    }
    AppError::BadRequest(e.body_text())
}

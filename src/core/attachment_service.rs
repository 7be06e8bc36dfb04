use crate::adapters::database::AttachmentRepository;
use crate::adapters::storage::ObjectStorage;
use crate::config::UploadConfig;
use crate::core::record_locks::RecordLocks;
use crate::domain::attachment::{Attachment, AttachmentStatus, NewAttachment, UploadRequest, storage_key};
use crate::error::{AppError, Leftover, MetadataError, Result, StorageError};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::error::Elapsed;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    uploads: Counter<u64>,
    upload_size_bytes: Histogram<u64>,
    compensations: Counter<u64>,
    reaped: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("attachment-coordinator");
        Self {
            uploads: meter
                .u64_counter("attachments_uploads_total")
                .with_description("Upload attempts by outcome")
                .build(),
            upload_size_bytes: meter
                .u64_histogram("attachments_upload_size_bytes")
                .with_description("Distribution of completed upload sizes")
                .build(),
            compensations: meter
                .u64_counter("attachments_compensations_total")
                .with_description("Rollbacks run after a failed upload step, by outcome")
                .build(),
            reaped: meter
                .u64_counter("attachments_reaped_total")
                .with_description("Abandoned records removed by the reaper")
                .build(),
        }
    }

    fn upload_outcome(&self, outcome: &'static str) {
        self.uploads.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Result of one reaper pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReapOutcome {
    /// Stale records returned by the metadata store.
    pub scanned: usize,
    /// Records removed together with their objects.
    pub reaped: u64,
}

/// Coordinates the metadata store and the object store so that records and objects stay
/// consistent across partial failures.
#[derive(Clone, Debug)]
pub struct AttachmentService {
    storage: Arc<dyn ObjectStorage>,
    repo: Arc<dyn AttachmentRepository>,
    config: UploadConfig,
    locks: RecordLocks,
    metrics: Metrics,
}

impl AttachmentService {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>, repo: Arc<dyn AttachmentRepository>, config: UploadConfig) -> Self {
        Self { storage, repo, config, locks: RecordLocks::new(), metrics: Metrics::new() }
    }

    #[must_use]
    pub const fn max_size_bytes(&self) -> usize {
        self.config.max_size_bytes
    }

    /// Validates and stores an upload, returning the completed record.
    ///
    /// The record is created `Pending` before the object is written and marked `Complete` once
    /// the store has issued a public URL. Failures before finalization are rolled back.
    ///
    /// # Errors
    /// - `AppError::Validation` before any side effect.
    /// - `AppError::MetadataStore` if the record cannot be created.
    /// - `AppError::ObjectStore` if the object cannot be stored or has no public URL; the record
    ///   and any object this call may have written have been removed. An object refused with
    ///   `StorageError::AlreadyExists` is left untouched.
    /// - `AppError::Finalization` if the record update fails; the object is kept and
    ///   [`finalize`](Self::finalize) can be retried.
    /// - `AppError::Orphaned` if rolling back itself failed.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, request),
        fields(
            attachment_id = tracing::field::Empty,
            attachment_key = tracing::field::Empty,
            attachment_size = request.bytes.len(),
        )
    )]
    pub async fn upload(&self, request: UploadRequest) -> Result<Attachment> {
        if let Err(e) = request.validate(self.config.max_size_bytes) {
            self.metrics.upload_outcome("rejected");
            return Err(e.into());
        }

        let id = Uuid::new_v4();
        let key = storage_key(&self.config.key_prefix, Uuid::new_v4(), &request.file_name);
        tracing::Span::current().record("attachment_id", tracing::field::display(id));
        tracing::Span::current().record("attachment_key", key.as_str());

        let _guard = self.locks.acquire(id).await;
        let size = request.bytes.len();

        let new = NewAttachment {
            id,
            key: key.clone(),
            file_name: request.file_name,
            mime_type: request.mime_type.clone(),
            size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
        };
        if let Err(e) = self.bounded(self.repo.create(new)).await {
            tracing::error!(error = %e, "Failed to create pending record");
            self.metrics.upload_outcome("failed");
            return Err(AppError::MetadataStore(e));
        }

        if let Err(e) = self.bounded(self.storage.put(&key, request.bytes, &request.mime_type, true)).await {
            tracing::error!(error = %e, "Object upload failed, reverting record");
            self.metrics.upload_outcome("failed");
            // A failed put may still have written the object. Only a refused one belongs to
            // someone else and must stay.
            let object = (!matches!(e, StorageError::AlreadyExists)).then_some(key.as_str());
            return Err(self.roll_back(AppError::ObjectStore(e), id, object).await);
        }

        let Some(url) = self.public_url(&key).await else {
            tracing::error!("Object stored but no public URL issued, reverting upload");
            self.metrics.upload_outcome("failed");
            return Err(self.roll_back(AppError::ObjectStore(StorageError::UrlUnavailable), id, Some(&key)).await);
        };

        match self.bounded(self.repo.complete(id, &url)).await {
            Ok(attachment) => {
                self.metrics.upload_outcome("complete");
                self.metrics.upload_size_bytes.record(size as u64, &[]);
                tracing::debug!(url = %url, "Attachment uploaded");
                Ok(attachment)
            }
            Err(source) => {
                tracing::error!(error = %source, "Object stored but record could not be finalized");
                self.metrics.upload_outcome("unfinalized");
                Err(AppError::Finalization { id, key, source })
            }
        }
    }

    /// Retries the last upload step for a record whose object is already stored.
    ///
    /// Completed records are returned unchanged.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the record does not exist (including when it was deleted
    ///   concurrently).
    /// - `AppError::Conflict` if the upload was abandoned.
    /// - `AppError::ObjectStore` if the object is missing or no public URL can be issued.
    /// - `AppError::Finalization` if the record update fails again.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(attachment_id = %id))]
    pub async fn finalize(&self, id: Uuid) -> Result<Attachment> {
        let _guard = self.locks.acquire(id).await;

        let attachment = self.bounded(self.repo.find_by_id(id)).await?.ok_or(AppError::NotFound)?;
        match attachment.status {
            AttachmentStatus::Complete => return Ok(attachment),
            AttachmentStatus::Failed => return Err(AppError::Conflict("Attachment upload was abandoned".into())),
            AttachmentStatus::Pending => {}
        }

        if !self.bounded(self.storage.exists(&attachment.key)).await? {
            return Err(AppError::ObjectStore(StorageError::NotFound));
        }

        let url = self.public_url(&attachment.key).await.ok_or(AppError::ObjectStore(StorageError::UrlUnavailable))?;

        let attachment = self.bounded(self.repo.complete(id, &url)).await.map_err(|source| match source {
            MetadataError::NotFound => AppError::NotFound,
            source => AppError::Finalization { id, key: attachment.key, source },
        })?;

        tracing::info!("Attachment finalized");
        Ok(attachment)
    }

    /// Looks up a record.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if absent.
    #[tracing::instrument(err(level = "debug"), skip(self), fields(attachment_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Attachment> {
        self.bounded(self.repo.find_by_id(id)).await?.ok_or(AppError::NotFound)
    }

    /// Removes the stored object and the record.
    ///
    /// Both removals are attempted even if the first fails. A missing object counts as removed.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the record does not exist.
    /// - `AppError::MetadataStore` if the record could not be deleted.
    /// - `AppError::ObjectStore` if neither removal succeeded.
    /// - `AppError::Orphaned` if the record is gone but the object could not be removed.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(attachment_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.locks.acquire(id).await;

        let attachment = self.bounded(self.repo.find_by_id(id)).await?.ok_or(AppError::NotFound)?;

        let object_res = match self.bounded(self.storage.delete(&attachment.key)).await {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(e) => Err(e),
        };
        let record_res = match self.bounded(self.repo.delete(id)).await {
            Ok(()) | Err(MetadataError::NotFound) => Ok(()),
            Err(e) => Err(e),
        };

        match (object_res, record_res) {
            (Ok(()), Ok(())) => {
                tracing::debug!(key = %attachment.key, "Attachment deleted");
                Ok(())
            }
            (Ok(()), Err(e)) => {
                tracing::error!(error = %e, "Object removed but record could not be deleted");
                Err(AppError::MetadataStore(e))
            }
            (Err(e), Ok(())) => {
                tracing::error!(error = %e, key = %attachment.key, "Record deleted but object could not be removed");
                Err(AppError::Orphaned {
                    cause: Box::new(AppError::ObjectStore(e)),
                    leftovers: vec![Leftover::Object { key: attachment.key }],
                })
            }
            (Err(storage_err), Err(metadata_err)) => {
                tracing::error!(
                    storage_error = %storage_err,
                    metadata_error = %metadata_err,
                    "Neither object nor record could be removed"
                );
                Err(AppError::ObjectStore(storage_err))
            }
        }
    }

    /// Removes `Failed` records, and `Pending` records older than `pending_grace`, together
    /// with their objects.
    ///
    /// A record is only deleted after its object is gone, so a failed removal keeps the
    /// reference for the next pass.
    ///
    /// # Errors
    /// Returns `AppError::MetadataStore` if stale records cannot be listed.
    #[tracing::instrument(err, skip(self), fields(batch_count = tracing::field::Empty))]
    pub async fn reap(&self, batch_size: i64, pending_grace: time::Duration) -> Result<ReapOutcome> {
        let cutoff = OffsetDateTime::now_utc() - pending_grace;
        let stale = self.bounded(self.repo.fetch_stale(cutoff, batch_size)).await.map_err(AppError::MetadataStore)?;
        tracing::Span::current().record("batch_count", stale.len());

        let mut outcome = ReapOutcome { scanned: stale.len(), reaped: 0 };
        for candidate in stale {
            let _guard = self.locks.acquire(candidate.id).await;

            // Re-read under the lock: a finalize may have completed it since the listing.
            let current = match self.bounded(self.repo.find_by_id(candidate.id)).await {
                Ok(Some(current)) if current.is_stale_at(OffsetDateTime::now_utc(), pending_grace) => current,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, attachment_id = %candidate.id, "Failed to re-read stale record");
                    continue;
                }
            };

            match self.bounded(self.storage.delete(&current.key)).await {
                Ok(()) | Err(StorageError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(error = %e, key = %current.key, "Object delete failed, keeping record");
                    continue;
                }
            }

            match self.bounded(self.repo.delete(current.id)).await {
                Ok(()) | Err(MetadataError::NotFound) => outcome.reaped += 1,
                Err(e) => tracing::warn!(error = %e, attachment_id = %current.id, "Record delete failed"),
            }
        }

        if outcome.reaped > 0 {
            self.metrics.reaped.add(outcome.reaped, &[]);
            tracing::info!(reaped = outcome.reaped, scanned = outcome.scanned, "Reaped abandoned attachments");
        }
        Ok(outcome)
    }

    /// Reverts a failed upload: removes `object` (if given) and then the record.
    ///
    /// When the object cannot be removed the record is kept and marked `Failed` so the object
    /// stays referenced. Anything left behind is reported through `AppError::Orphaned`.
    async fn roll_back(&self, cause: AppError, id: Uuid, object: Option<&str>) -> AppError {
        let mut leftovers = Vec::new();

        if let Some(key) = object {
            match self.bounded(self.storage.delete(key)).await {
                Ok(()) | Err(StorageError::NotFound) => {}
                Err(e) => {
                    tracing::error!(error = %e, key = %key, "Compensation failed to remove object");
                    leftovers.push(Leftover::Object { key: key.to_string() });
                }
            }
        }

        if leftovers.is_empty() {
            match self.bounded(self.repo.delete(id)).await {
                Ok(()) | Err(MetadataError::NotFound) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Compensation failed to delete record");
                    self.flag_failed(id).await;
                    leftovers.push(Leftover::Record { id });
                }
            }
        } else {
            self.flag_failed(id).await;
            leftovers.push(Leftover::Record { id });
        }

        if leftovers.is_empty() {
            self.metrics.compensations.add(1, &[KeyValue::new("outcome", "clean")]);
            cause
        } else {
            self.metrics.compensations.add(1, &[KeyValue::new("outcome", "orphaned")]);
            AppError::Orphaned { cause: Box::new(cause), leftovers }
        }
    }

    async fn flag_failed(&self, id: Uuid) {
        if let Err(e) = self.bounded(self.repo.mark_failed(id)).await {
            tracing::error!(error = %e, "Failed to mark record as failed");
        }
    }

    async fn public_url(&self, key: &str) -> Option<String> {
        match tokio::time::timeout(self.config.call_timeout(), self.storage.public_url(key)).await {
            Ok(url) => url.filter(|url| !url.is_empty()),
            Err(_) => {
                tracing::warn!(key = %key, "Public URL request timed out");
                None
            }
        }
    }

    async fn bounded<T, E>(&self, call: impl Future<Output = std::result::Result<T, E>>) -> std::result::Result<T, E>
    where
        E: From<Elapsed>,
    {
        tokio::time::timeout(self.config.call_timeout(), call).await?
    }
}

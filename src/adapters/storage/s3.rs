use crate::adapters::storage::ObjectStorage;
use crate::error::StorageError;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

const PRECONDITION_FAILED: u16 = 412;

#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl S3Storage {
    #[must_use]
    pub fn new(client: Client, bucket: String, public_base_url: Option<String>) -> Self {
        let public_base_url = public_base_url.map(|base| base.trim_end_matches('/').to_string());
        Self { client, bucket, public_base_url }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, key: &str, body: Bytes, content_type: &str, if_not_exists: bool) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(i64::try_from(body.len()).unwrap_or(i64::MAX))
            .body(ByteStream::from(body));

        if if_not_exists {
            request = request.if_none_match("*");
        }

        request.send().await.map_err(|e| {
            if e.raw_response().is_some_and(|r| r.status().as_u16() == PRECONDITION_FAILED) {
                tracing::warn!(key = %key, "S3 Upload refused, key already exists");
                return StorageError::AlreadyExists;
            }
            tracing::error!(error = %DisplayErrorContext(&e), key = %key, "S3 Upload failed");
            StorageError::Backend(DisplayErrorContext(&e).to_string())
        })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self.client.get_object().bucket(&self.bucket).key(key).send().await.map_err(|e| {
            if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                return StorageError::NotFound;
            }
            tracing::error!(error = %DisplayErrorContext(&e), key = %key, "S3 Download failed");
            StorageError::Backend(DisplayErrorContext(&e).to_string())
        })?;

        let body = output.body.collect().await.map_err(|e| {
            tracing::error!(error = ?e, key = %key, "S3 Stream error");
            StorageError::Backend(e.to_string())
        })?;

        Ok(body.into_bytes())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(HeadObjectError::is_not_found) => Ok(false),
            Err(e) => {
                tracing::error!(error = %DisplayErrorContext(&e), key = %key, "S3 Head failed");
                Err(StorageError::Backend(DisplayErrorContext(&e).to_string()))
            }
        }
    }

    async fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url.as_ref().map(|base| format!("{base}/{}/{key}", self.bucket))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        // DeleteObject succeeds on missing keys, so existence is checked first.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound);
        }

        self.client.delete_object().bucket(&self.bucket).key(key).send().await.map_err(|e| {
            tracing::error!(error = %DisplayErrorContext(&e), key = %key, "S3 Delete failed");
            StorageError::Backend(DisplayErrorContext(&e).to_string())
        })?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.client.head_bucket().bucket(&self.bucket).send().await.map_err(|e| {
            StorageError::Backend(format!("bucket {}: {}", self.bucket, DisplayErrorContext(&e)))
        })?;
        Ok(())
    }
}

use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

pub mod memory;
pub mod s3;

pub use memory::InMemoryStorage;
pub use s3::S3Storage;

/// Key-addressed blob storage that can issue public URLs.
#[async_trait]
pub trait ObjectStorage: Debug + Send + Sync + 'static {
    /// Stores `body` under `key`. With `if_not_exists`, an occupied key fails with
    /// `StorageError::AlreadyExists` instead of being overwritten.
    async fn put(&self, key: &str, body: Bytes, content_type: &str, if_not_exists: bool) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Public retrieval URL for `key`, if the store can issue one.
    async fn public_url(&self, key: &str) -> Option<String>;

    /// Removes `key`. A missing object yields `StorageError::NotFound`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Connectivity check used by the readiness probe.
    async fn ping(&self) -> Result<(), StorageError>;
}

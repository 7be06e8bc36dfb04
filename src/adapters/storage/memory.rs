use crate::adapters::storage::ObjectStorage;
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

const DEFAULT_PUBLIC_BASE_URL: &str = "memory://attachments";

#[derive(Clone, Debug)]
struct StoredObject {
    body: Bytes,
    content_type: String,
}

/// Process-local object store for tests and local development.
#[derive(Clone, Debug)]
pub struct InMemoryStorage {
    objects: Arc<DashMap<String, StoredObject>>,
    public_base_url: String,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self { objects: Arc::new(DashMap::new()), public_base_url: public_base_url.into() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|o| o.content_type.clone())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_BASE_URL)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn put(&self, key: &str, body: Bytes, content_type: &str, if_not_exists: bool) -> Result<(), StorageError> {
        let object = StoredObject { body, content_type: content_type.to_string() };
        match self.objects.entry(key.to_string()) {
            Entry::Occupied(_) if if_not_exists => Err(StorageError::AlreadyExists),
            Entry::Occupied(mut entry) => {
                entry.insert(object);
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(object);
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects.get(key).map(|o| o.body.clone()).ok_or(StorageError::NotFound)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.contains_key(key))
    }

    async fn public_url(&self, key: &str) -> Option<String> {
        Some(format!("{}/{key}", self.public_base_url.trim_end_matches('/')))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.remove(key).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BlobLocation, BlobReader, BlobStore, UploadReceipt};
use sales_etl_common::{EtlError, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// In-process [`BlobStore`]. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<BlobLocation, StoredObject>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, bypassing [`BlobStore::put`].
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock().insert(
            BlobLocation::new(bucket, key),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn get_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&BlobLocation::new(bucket, key))
            .map(|object| object.data.clone())
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock()
            .get(&BlobLocation::new(bucket, key))
            .map(|object| object.content_type.clone())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock().contains_key(&BlobLocation::new(bucket, key))
    }

    /// All stored keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|location| location.bucket == bucket)
            .map(|location| location.key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BlobLocation, StoredObject>> {
        // A poisoned map is still structurally valid.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, location: &BlobLocation) -> Result<BlobReader> {
        let data = self
            .lock()
            .get(location)
            .map(|object| object.data.clone())
            .ok_or_else(|| EtlError::SourceNotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                source: "NoSuchKey: the specified key does not exist".into(),
            })?;

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn put(
        &self,
        location: &BlobLocation,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadReceipt> {
        let receipt = UploadReceipt::for_bytes(location.key.clone(), &data);
        self.lock().insert(
            location.clone(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(receipt)
    }
}

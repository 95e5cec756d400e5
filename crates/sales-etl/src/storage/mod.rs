//! Object storage access
//!
//! The pipeline only needs two operations from a blob store: open an object
//! for streamed reading and upload a finished object. [`S3BlobStore`] talks to
//! S3 (or any S3-compatible endpoint such as MinIO); [`MemoryBlobStore`] keeps
//! objects in process.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;

use sales_etl_common::Result;

pub mod config;
mod memory;
mod s3;

pub use config::StorageConfig;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// Content type of every uploaded CSV file.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Lazily consumed object body
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Bucket and key of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub bucket: String,
    pub key: String,
}

impl BlobLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Same bucket, different key.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self::new(self.bucket.clone(), key)
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// What a successful upload wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub key: String,
    pub size: u64,
    /// SHA-256 of the uploaded bytes, lowercase hex.
    pub checksum: String,
}

impl UploadReceipt {
    pub fn for_bytes(key: impl Into<String>, data: &[u8]) -> Self {
        Self {
            key: key.into(),
            size: data.len() as u64,
            checksum: calculate_sha256(data),
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open an object for reading.
    ///
    /// Fails with `EtlError::SourceNotFound` when the object is missing or
    /// cannot be accessed. Errors surfacing later while reading belong to the
    /// caller.
    async fn get(&self, location: &BlobLocation) -> Result<BlobReader>;

    /// Upload `data` as one object, replacing any existing object at the key.
    ///
    /// Fails with `EtlError::SinkWriteError`.
    async fn put(
        &self,
        location: &BlobLocation,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadReceipt>;
}

pub fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

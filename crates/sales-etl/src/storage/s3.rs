use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use super::{BlobLocation, BlobReader, BlobStore, StorageConfig, UploadReceipt};
use sales_etl_common::{EtlError, Result};

/// [`BlobStore`] backed by S3 or an S3-compatible endpoint
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub async fn new(config: &StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let Some((access_key, secret_key)) = config.static_credentials() {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "sales-etl",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = %config.region, endpoint = ?config.endpoint, "Storage client initialized");

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self), fields(location = %location))]
    async fn get(&self, location: &BlobLocation) -> Result<BlobReader> {
        debug!("Opening {}", location);

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| EtlError::SourceNotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                source: DisplayErrorContext(e).to_string().into(),
            })?;

        debug!(content_length = ?response.content_length(), "Object opened");

        Ok(Box::pin(response.body.into_async_read()))
    }

    #[instrument(skip(self, data), fields(location = %location, size = data.len()))]
    async fn put(
        &self,
        location: &BlobLocation,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadReceipt> {
        let receipt = UploadReceipt::for_bytes(location.key.clone(), &data);

        debug!("Uploading {} bytes to {}", receipt.size, location);

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| EtlError::SinkWriteError {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                source: DisplayErrorContext(e).to_string().into(),
            })?;

        info!("Successfully uploaded to {}", location);

        Ok(receipt)
    }
}

//! Common test utilities for sales ETL integration tests
//!
//! In-process collaborators (an insert-or-ignore sink and blob stores that
//! fail on demand), CSV fixtures, and container wrappers for the
//! Docker-backed tests.

#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use sales_etl::models::Sale;
use sales_etl::sink::{SalesSink, SinkConnector};
use sales_etl::storage::{
    BlobLocation, BlobReader, BlobStore, MemoryBlobStore, StorageConfig, UploadReceipt,
};
use sales_etl::{EtlError, Result as EtlResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use testcontainers_modules::postgres::Postgres;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::{debug, info};

pub const RAW_HEADER: &str = "Region,Country,Item Type,Sales Channel,Order Priority,Order Date,Order ID,Ship Date,Units Sold,Unit Price,Unit Cost,Total Revenue,Total Cost,Total Profit";

pub const CLEAN_HEADER: &str = "Region,Country,Item Type,Sales Channel,Order Priority,Order Date,Order ID,Ship Date,Units Sold,Unit Price,Unit Cost,Total Revenue,Total Cost,Total Profit,Order Processing Time,Gross Margin";

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sales_etl=debug")
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fixtures
// ============================================================================

/// A valid 14-field extract line.
pub fn extract_line(order_id: i64) -> String {
    format!(
        "Europe,Latvia,Beverages,Online,C,12/28/2015,{order_id},1/23/2016,1075,47.45,31.79,51008.75,34174.25,16834.50"
    )
}

/// A valid 16-field cleaned line.
pub fn clean_line(order_id: i64) -> String {
    format!(
        "Europe,Latvia,Beverages,Online,Critical,12/28/2015,{order_id},1/23/2016,1075,47.45,31.79,51008.75,34174.25,16834.50,26,0.3300"
    )
}

/// Header plus `lines`, newline-terminated.
pub fn csv(header: &str, lines: &[String]) -> String {
    let mut text = String::from(header);
    text.push('\n');
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}

/// Data rows of a CSV document (header excluded).
pub fn data_rows(text: &str) -> Vec<String> {
    text.lines().skip(1).map(str::to_string).collect()
}

// ============================================================================
// In-memory sink
// ============================================================================

#[derive(Debug, Default)]
pub struct SinkState {
    pub committed: BTreeMap<i64, Sale>,
    pub pending: BTreeMap<i64, Sale>,
    pub ddl: Vec<String>,
    /// Rows attempted per `insert_ignore` call.
    pub batches: Vec<usize>,
    pub connects: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    /// Fail the n-th (1-based) `insert_ignore` call.
    pub fail_on_batch: Option<usize>,
    pub refuse_connections: bool,
}

/// Insert-or-ignore sink over shared state. Every connection sees the
/// committed rows of earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<SinkState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_batch(batch: usize) -> Self {
        let connector = Self::new();
        connector.state().fail_on_batch = Some(batch);
        connector
    }

    pub fn refusing() -> Self {
        let connector = Self::new();
        connector.state().refuse_connections = true;
        connector
    }

    pub fn state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn committed_ids(&self) -> Vec<i64> {
        self.state().committed.keys().copied().collect()
    }
}

#[async_trait]
impl SinkConnector for MemoryConnector {
    async fn connect(&self) -> EtlResult<Box<dyn SalesSink>> {
        let mut state = self.state();
        if state.refuse_connections {
            return Err(EtlError::ConnectionError("connection refused".into()));
        }
        state.connects += 1;
        Ok(Box::new(MemorySink {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    closed: bool,
}

impl MemorySink {
    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SalesSink for MemorySink {
    async fn execute(&mut self, ddl: &str) -> EtlResult<()> {
        self.state().ddl.push(ddl.to_string());
        Ok(())
    }

    async fn insert_ignore(&mut self, rows: &[Sale]) -> EtlResult<u64> {
        let mut state = self.state();
        state.batches.push(rows.len());

        if state.fail_on_batch == Some(state.batches.len()) {
            return Err(EtlError::BatchExecutionError {
                rows: rows.len(),
                source: "simulated constraint violation".into(),
            });
        }

        let mut inserted = 0;
        for sale in rows {
            if state.committed.contains_key(&sale.order_id) || state.pending.contains_key(&sale.order_id) {
                continue;
            }
            state.pending.insert(sale.order_id, sale.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn commit(&mut self) -> EtlResult<()> {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> EtlResult<()> {
        let mut state = self.state();
        state.pending.clear();
        state.rollbacks += 1;
        Ok(())
    }

    async fn close(&mut self) -> EtlResult<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.state();
            state.pending.clear();
            state.closes += 1;
        }
        Ok(())
    }
}

// ============================================================================
// Blob stores that fail
// ============================================================================

struct ResetReader;

impl AsyncRead for ResetReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")))
    }
}

/// Serves `prefix`, then fails every read. Uploads go to the inner store.
pub struct TruncatedStore {
    pub inner: MemoryBlobStore,
    prefix: Vec<u8>,
}

impl TruncatedStore {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl BlobStore for TruncatedStore {
    async fn get(&self, _location: &BlobLocation) -> EtlResult<BlobReader> {
        let body = std::io::Cursor::new(self.prefix.clone()).chain(ResetReader);
        Ok(Box::pin(body))
    }

    async fn put(&self, location: &BlobLocation, data: Vec<u8>, content_type: &str) -> EtlResult<UploadReceipt> {
        self.inner.put(location, data, content_type).await
    }
}

/// Reads from the inner store, rejects every upload.
pub struct ReadOnlyStore {
    pub inner: MemoryBlobStore,
}

#[async_trait]
impl BlobStore for ReadOnlyStore {
    async fn get(&self, location: &BlobLocation) -> EtlResult<BlobReader> {
        self.inner.get(location).await
    }

    async fn put(&self, location: &BlobLocation, _data: Vec<u8>, _content_type: &str) -> EtlResult<UploadReceipt> {
        Err(EtlError::SinkWriteError {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            source: "AccessDenied".into(),
        })
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// ============================================================================
// MinIO Test Container
// ============================================================================

pub const MINIO_ACCESS_KEY: &str = "minioadmin";
pub const MINIO_SECRET_KEY: &str = "minioadmin";

pub struct TestMinio {
    container: ContainerAsync<GenericImage>,
    client: S3Client,
    endpoint: String,
    bucket: String,
}

impl TestMinio {
    pub async fn start(bucket: &str) -> Result<Self> {
        info!("Starting MinIO test container...");

        let container = GenericImage::new("minio/minio", "latest")
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("MinIO Object Storage Server"))
            .with_env_var("MINIO_ROOT_USER", MINIO_ACCESS_KEY)
            .with_env_var("MINIO_ROOT_PASSWORD", MINIO_SECRET_KEY)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .context("Failed to start MinIO container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get MinIO host")?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .context("Failed to get MinIO port")?;

        let endpoint = format!("http://{}:{}", host, port);
        debug!("MinIO endpoint: {}", endpoint);

        let s3_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                MINIO_ACCESS_KEY,
                MINIO_SECRET_KEY,
                None,
                None,
                "static",
            ))
            .load()
            .await;

        let client = S3Client::from_conf(
            aws_sdk_s3::config::Builder::from(&s3_config)
                .force_path_style(true)
                .build(),
        );

        client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .context("Failed to create S3 bucket")?;

        Ok(Self {
            container,
            client,
            endpoint,
            bucket: bucket.to_string(),
        })
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::for_minio(self.endpoint.clone())
    }
}

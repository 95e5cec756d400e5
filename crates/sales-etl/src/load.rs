//! Load stage: cleaned CSV into the `sales_data` table
//!
//! The loader opens the source object, then the sink, makes sure the table
//! exists and streams rows into it in fixed-size batches. Every batch is one
//! insert-or-ignore statement followed by a commit; rows the sink reports as
//! not inserted count as duplicates.
//!
//! ```text
//! Init -> ConfigLoaded -> Connected -> TableReady -> Loading -> Committed
//!                  \___________\____________\___________\____> Failed(reason)
//! ```
//!
//! `Failed` rolls back the open batch before the connection is closed. The
//! connection is closed on every exit path once it has been opened.

use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::{ReadOutcome, RecordReader};
use crate::config::DEFAULT_LOAD_BATCH_SIZE;
use crate::models::{LoadResult, Sale};
use crate::parser::{is_header, RecordParser};
use crate::sink::{SalesSink, SinkConnector, CREATE_TABLE_SQL};
use crate::storage::{BlobLocation, BlobReader, BlobStore};
use sales_etl_common::{EtlError, Result};

/// Lifecycle of one load run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Init,
    ConfigLoaded,
    Connected,
    TableReady,
    Loading,
    Committed,
    Failed(String),
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Init => f.write_str("Init"),
            LoadState::ConfigLoaded => f.write_str("ConfigLoaded"),
            LoadState::Connected => f.write_str("Connected"),
            LoadState::TableReady => f.write_str("TableReady"),
            LoadState::Loading => f.write_str("Loading"),
            LoadState::Committed => f.write_str("Committed"),
            LoadState::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

/// Milestones of a run, in milliseconds since the run started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTimings {
    pub s3_download_start: u64,
    pub s3_download_end: u64,
    pub db_connection_start: u64,
    pub db_connection_end: u64,
    pub data_load_start: u64,
    pub data_load_end: u64,
}

/// Outcome of a successful load run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub bucket_name: String,
    pub file_name: String,
    pub rows_loaded: u64,
    pub duplicates_skipped: u64,
    pub total_rows_processed: u64,
    pub lines_skipped: u64,
    /// Total run time in milliseconds.
    pub runtime: u64,
    pub timings: LoadTimings,
    pub value: String,
}

impl LoadReport {
    pub fn result(&self) -> LoadResult {
        LoadResult {
            rows_loaded: self.rows_loaded,
            duplicates_skipped: self.duplicates_skipped,
            total_rows_processed: self.total_rows_processed,
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    total_rows: u64,
    rows_loaded: u64,
    lines_skipped: u64,
    batches: u64,
}

pub struct BatchLoader<'a> {
    store: &'a dyn BlobStore,
    batch_size: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_LOAD_BATCH_SIZE,
        }
    }

    /// Rows per insert statement. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load `source` through a sink opened with `connector`.
    #[instrument(skip(self, connector), fields(source = %source, batch_size = self.batch_size))]
    pub async fn run(
        &self,
        source: &BlobLocation,
        connector: &dyn SinkConnector,
    ) -> Result<LoadReport> {
        let clock = Instant::now();
        let elapsed = || clock.elapsed().as_millis() as u64;
        let mut state = LoadState::Init;
        let mut timings = LoadTimings::default();

        transition(&mut state, LoadState::ConfigLoaded);

        timings.s3_download_start = elapsed();
        let body = match self.store.get(source).await {
            Ok(body) => body,
            Err(err) => {
                transition(&mut state, LoadState::Failed(err.to_string()));
                return Err(err);
            },
        };
        timings.s3_download_end = elapsed();

        timings.db_connection_start = elapsed();
        let mut sink = match connector.connect().await {
            Ok(sink) => sink,
            Err(err) => {
                transition(&mut state, LoadState::Failed(err.to_string()));
                return Err(err);
            },
        };
        timings.db_connection_end = elapsed();
        transition(&mut state, LoadState::Connected);

        let outcome = self
            .load(sink.as_mut(), body, source, &mut state, &mut timings, &elapsed)
            .await;

        let progress = match outcome {
            Ok(progress) => progress,
            Err(err) => {
                transition(&mut state, LoadState::Failed(err.to_string()));
                if let Err(rollback_err) = sink.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                release(sink.as_mut()).await;
                return Err(err);
            },
        };

        release(sink.as_mut()).await;

        let result = LoadResult::from_counts(progress.total_rows, progress.rows_loaded);
        let runtime = elapsed();

        info!(
            rows_loaded = result.rows_loaded,
            duplicates_skipped = result.duplicates_skipped,
            total_rows_processed = result.total_rows_processed,
            lines_skipped = progress.lines_skipped,
            batches = progress.batches,
            runtime_ms = runtime,
            "Load complete"
        );

        Ok(LoadReport {
            bucket_name: source.bucket.clone(),
            file_name: source.key.clone(),
            rows_loaded: result.rows_loaded,
            duplicates_skipped: result.duplicates_skipped,
            total_rows_processed: result.total_rows_processed,
            lines_skipped: progress.lines_skipped,
            runtime,
            timings,
            value: format!(
                "Loaded {} rows from {} ({} duplicates skipped, {} lines skipped)",
                result.rows_loaded, source, result.duplicates_skipped, progress.lines_skipped
            ),
        })
    }

    async fn load(
        &self,
        sink: &mut dyn SalesSink,
        body: BlobReader,
        source: &BlobLocation,
        state: &mut LoadState,
        timings: &mut LoadTimings,
        elapsed: &(dyn Fn() -> u64 + Send + Sync),
    ) -> Result<Progress> {
        sink.execute(CREATE_TABLE_SQL).await?;
        transition(state, LoadState::TableReady);

        timings.data_load_start = elapsed();
        transition(state, LoadState::Loading);

        let parser = RecordParser::load();
        let mut records = RecordReader::new(body);
        let mut batch: Vec<Sale> = Vec::with_capacity(self.batch_size);
        let mut progress = Progress::default();

        loop {
            let outcome = records.next_record().await.map_err(|e| EtlError::SourceRead {
                bucket: source.bucket.clone(),
                key: source.key.clone(),
                source: Box::new(e),
            })?;

            match outcome {
                ReadOutcome::Record { line, fields } => {
                    if fields.iter().all(|f| f.is_empty()) || is_header(&fields) {
                        continue;
                    }
                    match parser.parse_fields(&fields) {
                        Ok(sale) => batch.push(sale),
                        Err(reason) => {
                            warn!(line, %reason, "Skipping malformed record");
                            progress.lines_skipped += 1;
                        },
                    }
                },
                ReadOutcome::Undecodable { line, reason } => {
                    warn!(line, %reason, "Skipping undecodable record");
                    progress.lines_skipped += 1;
                },
                ReadOutcome::End => break,
            }

            if batch.len() >= self.batch_size {
                flush(sink, &mut batch, &mut progress).await?;
            }
        }

        if !batch.is_empty() {
            flush(sink, &mut batch, &mut progress).await?;
        }

        timings.data_load_end = elapsed();
        transition(state, LoadState::Committed);

        Ok(progress)
    }
}

async fn flush(sink: &mut dyn SalesSink, batch: &mut Vec<Sale>, progress: &mut Progress) -> Result<()> {
    let inserted = sink.insert_ignore(batch).await?;
    sink.commit().await?;

    progress.batches += 1;
    progress.total_rows += batch.len() as u64;
    progress.rows_loaded += inserted;

    debug!(
        batch = progress.batches,
        attempted = batch.len(),
        inserted,
        "Batch committed"
    );

    batch.clear();
    Ok(())
}

async fn release(sink: &mut dyn SalesSink) {
    if let Err(err) = sink.close().await {
        warn!(error = %err, "Failed to close sink connection");
    }
}

fn transition(state: &mut LoadState, next: LoadState) {
    match &next {
        LoadState::Failed(reason) => warn!(from = %state, %reason, "Load failed"),
        _ => debug!(from = %state, to = %next, "Load state transition"),
    }
    *state = next;
}

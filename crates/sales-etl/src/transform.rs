//! Transform stage: raw extract in, cleaned CSV out
//!
//! Reads the source object record by record, drops malformed lines and
//! repeated order IDs, and uploads the cleaned file next to the source under
//! a `-et` key (see [`derive_output_key`]).

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::codec::{self, ReadOutcome, RecordReader};
use crate::dedup::Deduplicator;
use crate::parser::{is_header, RecordParser};
use crate::storage::{BlobLocation, BlobStore, CSV_CONTENT_TYPE};
use sales_etl_common::{EtlError, Result};

/// Suffix inserted before the extension of the cleaned file's key.
pub const OUTPUT_SUFFIX: &str = "-et";

/// Outcome of a successful transform run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReport {
    pub status: String,
    pub bucket: String,
    pub new_file: String,
    /// Size of the uploaded file in bytes.
    pub size: u64,
    pub checksum: String,
    pub records_written: u64,
    pub lines_skipped: u64,
    pub runtime_ms: u64,
}

/// Key of the cleaned file for `source_key`.
///
/// `-et` goes before the extension of the last path segment (`data.csv` ->
/// `data-et.csv`, `in/q1.tar.csv` -> `in/q1.tar-et.csv`). Keys without an
/// extension get the suffix appended.
pub fn derive_output_key(source_key: &str) -> String {
    let segment_start = source_key.rfind('/').map_or(0, |i| i + 1);
    match source_key[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = segment_start + dot;
            format!("{}{}{}", &source_key[..dot], OUTPUT_SUFFIX, &source_key[dot..])
        },
        _ => format!("{source_key}{OUTPUT_SUFFIX}"),
    }
}

pub struct TransformStage<'a> {
    store: &'a dyn BlobStore,
}

impl<'a> TransformStage<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self { store }
    }

    /// Clean `source` and upload the result.
    ///
    /// Fails with `SourceNotFound`/`SourceRead` when the source cannot be read
    /// and `SinkWriteError` when the upload fails. Nothing is uploaded unless
    /// the whole source was read.
    #[instrument(skip(self), fields(source = %source))]
    pub async fn run(&self, source: &BlobLocation) -> Result<TransformReport> {
        let started = Instant::now();

        let body = self.store.get(source).await?;
        let mut records = RecordReader::new(body);

        let parser = RecordParser::extract();
        let mut dedup = Deduplicator::new();
        let mut sales = Vec::new();
        let mut lines_skipped = 0u64;

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
                        Ok(sale) => {
                            if dedup.observe(sale.order_id) {
                                sales.push(sale);
                            } else {
                                debug!(line, order_id = sale.order_id, "Dropping repeated order");
                            }
                        },
                        Err(reason) => {
                            warn!(line, %reason, "Skipping malformed record");
                            lines_skipped += 1;
                        },
                    }
                },
                ReadOutcome::Undecodable { line, reason } => {
                    warn!(line, %reason, "Skipping undecodable record");
                    lines_skipped += 1;
                },
                ReadOutcome::End => break,
            }
        }

        let body = codec::encode(&sales)?;
        let destination = source.with_key(derive_output_key(&source.key));
        let receipt = self.store.put(&destination, body, CSV_CONTENT_TYPE).await?;

        info!(
            destination = %destination,
            records = sales.len(),
            duplicates = dedup.dropped(),
            lines_skipped,
            size = receipt.size,
            "Transform complete"
        );

        Ok(TransformReport {
            status: "success".to_string(),
            bucket: source.bucket.clone(),
            new_file: receipt.key,
            size: receipt.size,
            checksum: receipt.checksum,
            records_written: sales.len() as u64,
            lines_skipped,
            runtime_ms: started.elapsed().as_millis() as u64,
        })
    }
}

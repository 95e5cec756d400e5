//! Sales ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Two-stage pipeline for sales record CSV files kept in object storage:
//!
//! - **Transform** ([`transform::TransformStage`]): reads a raw extract,
//!   normalizes each record, drops repeated order IDs and uploads a cleaned
//!   CSV next to the source (`data.csv` -> `data-et.csv`).
//! - **Load** ([`load::BatchLoader`]): reads a cleaned CSV and bulk-inserts it
//!   into the `sales_data` table in batches, ignoring primary-key conflicts so
//!   reruns are idempotent.
//!
//! Malformed lines never abort a run; they are logged and skipped. Storage and
//! database failures abort the run and come back as an [`EtlError`].
//!
//! # Example
//!
//! ```no_run
//! use sales_etl::storage::{BlobLocation, MemoryBlobStore};
//! use sales_etl::transform::TransformStage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryBlobStore::new();
//!     store.insert("raw", "sales.csv", "Region,Country\n");
//!
//!     let report = TransformStage::new(&store)
//!         .run(&BlobLocation::new("raw", "sales.csv"))
//!         .await?;
//!     println!("wrote {}", report.new_file);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dedup;
pub mod handler;
pub mod load;
pub mod models;
pub mod parser;
pub mod query;
pub mod sink;
pub mod storage;
pub mod transform;

pub use sales_etl_common::{EtlError, Result};

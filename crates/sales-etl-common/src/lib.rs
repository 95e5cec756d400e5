//! Sales ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the sales ETL workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the run-level [`EtlError`] taxonomy and [`Result`] alias
//! - **Logging**: `tracing` subscriber configuration shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use sales_etl_common::{EtlError, Result};
//!
//! fn require_bucket(bucket: Option<&str>) -> Result<&str> {
//!     bucket.ok_or_else(|| EtlError::InvalidRequest("missing bucket".to_string()))
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BoxError, EtlError, Result};

//! Relational sink for loaded sales rows
//!
//! The loader talks to the database only through [`SalesSink`]: run DDL,
//! insert a batch with insert-or-ignore semantics on `order_id`, and manage
//! the surrounding transaction. A [`SinkConnector`] opens one sink per run.

use async_trait::async_trait;

use crate::models::Sale;
use sales_etl_common::Result;

pub mod postgres;

pub use postgres::{PgConnector, PgSalesSink};

/// Target table name.
pub const SALES_TABLE: &str = "sales_data";

/// Columns written per row.
pub const SALES_COLUMN_COUNT: usize = 16;

/// Most rows one insert statement can carry under Postgres's 65,535
/// bind-parameter limit.
pub const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / SALES_COLUMN_COUNT;

/// Idempotent schema creation for [`SALES_TABLE`].
///
/// Dates are text: the load stage keeps unparseable dates verbatim, parsed
/// ones are stored as `YYYY-MM-DD`.
pub const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sales_data (
    order_id              BIGINT PRIMARY KEY,
    region                TEXT NOT NULL,
    country               TEXT NOT NULL,
    item_type             TEXT NOT NULL,
    sales_channel         TEXT NOT NULL,
    order_priority        TEXT NOT NULL,
    order_date            TEXT NOT NULL,
    ship_date             TEXT NOT NULL,
    units_sold            BIGINT NOT NULL,
    unit_price            NUMERIC(15, 2) NOT NULL,
    unit_cost             NUMERIC(15, 2) NOT NULL,
    total_revenue         NUMERIC(15, 2) NOT NULL,
    total_cost            NUMERIC(15, 2) NOT NULL,
    total_profit          NUMERIC(15, 2) NOT NULL,
    order_processing_time BIGINT NOT NULL,
    gross_margin          NUMERIC NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sales_data_region ON sales_data (region);
CREATE INDEX IF NOT EXISTS idx_sales_data_country ON sales_data (country);
CREATE INDEX IF NOT EXISTS idx_sales_data_item_type ON sales_data (item_type);
CREATE INDEX IF NOT EXISTS idx_sales_data_order_priority ON sales_data (order_priority);
"#;

/// One open connection to the relational store.
///
/// Inserts accumulate in an implicit transaction that starts with the first
/// statement after a `commit` or `rollback`.
#[async_trait]
pub trait SalesSink: Send {
    /// Run a DDL script outside the batch transaction.
    async fn execute(&mut self, ddl: &str) -> Result<()>;

    /// Insert `rows`, silently skipping any whose `order_id` already exists
    /// (in the table or earlier in `rows`). Returns the number inserted.
    /// Any number of rows is accepted.
    async fn insert_ignore(&mut self, rows: &[Sale]) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection. Uncommitted work is discarded. Safe to call
    /// more than once.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Fails with `EtlError::ConnectionError` when the store is unreachable.
    async fn connect(&self) -> Result<Box<dyn SalesSink>>;
}

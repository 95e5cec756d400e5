use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{SalesSink, SinkConnector, MAX_ROWS_PER_STATEMENT};
use crate::config::DatabaseConfig;
use crate::models::Sale;
use sales_etl_common::{EtlError, Result};

const INSERT_PREFIX: &str = r#"
    INSERT INTO sales_data (
        order_id,
        region,
        country,
        item_type,
        sales_channel,
        order_priority,
        order_date,
        ship_date,
        units_sold,
        unit_price,
        unit_cost,
        total_revenue,
        total_cost,
        total_profit,
        order_processing_time,
        gross_margin
    )
"#;

/// One `INSERT .. ON CONFLICT DO NOTHING` statement for `rows`.
fn insert_statement(rows: &[Sale]) -> QueryBuilder<'_, Postgres> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_PREFIX);

    query_builder.push_values(rows, |mut b, sale| {
        b.push_bind(sale.order_id)
            .push_bind(&sale.region)
            .push_bind(&sale.country)
            .push_bind(&sale.item_type)
            .push_bind(&sale.sales_channel)
            .push_bind(sale.order_priority.as_str())
            .push_bind(sale.order_date.to_sql_value())
            .push_bind(sale.ship_date.to_sql_value())
            .push_bind(sale.units_sold)
            .push_bind(sale.unit_price)
            .push_bind(sale.unit_cost)
            .push_bind(sale.total_revenue)
            .push_bind(sale.total_cost)
            .push_bind(sale.total_profit)
            .push_bind(sale.order_processing_time)
            .push_bind(sale.gross_margin);
    });

    query_builder.push(" ON CONFLICT (order_id) DO NOTHING");
    query_builder
}

/// Opens a single-connection Postgres pool per run
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.url.clone(), Duration::from_secs(config.connect_timeout_secs))
    }
}

#[async_trait]
impl SinkConnector for PgConnector {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<Box<dyn SalesSink>> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect(&self.url)
            .await
            .map_err(|e| EtlError::ConnectionError(Box::new(e)))?;

        info!("Database connection established");

        Ok(Box::new(PgSalesSink::new(pool)))
    }
}

/// [`SalesSink`] over a Postgres pool
pub struct PgSalesSink {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSalesSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self
                .pool
                .begin()
                .await
                .map_err(|e| EtlError::ConnectionError(Box::new(e)))?,
        };
        Ok(self.tx.insert(tx))
    }
}

#[async_trait]
impl SalesSink for PgSalesSink {
    async fn execute(&mut self, ddl: &str) -> Result<()> {
        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::SchemaError(Box::new(e)))?;
        Ok(())
    }

    async fn insert_ignore(&mut self, rows: &[Sale]) -> Result<u64> {
        let mut inserted = 0u64;

        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder = insert_statement(chunk);
            let tx = self.transaction().await?;
            let result = query_builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| EtlError::BatchExecutionError {
                    rows: rows.len(),
                    source: Box::new(e),
                })?;
            inserted += result.rows_affected();
        }

        debug!(attempted = rows.len(), inserted, "Batch executed");

        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .map_err(|e| EtlError::CommitError(Box::new(e)))?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .map_err(|e| EtlError::ConnectionError(Box::new(e)))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping an open transaction rolls it back.
        self.tx.take();
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!("Database connection closed");
        }
        Ok(())
    }
}

//! Summary queries over the loaded `sales_data` table

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};

use sales_etl_common::{EtlError, Result};

/// Number of countries in [`SalesSummary::top_countries_by_profit`].
pub const TOP_COUNTRIES: i64 = 5;

const REVENUE_BY_REGION_SQL: &str = r#"
    SELECT region, SUM(total_revenue) AS total_revenue
    FROM sales_data
    GROUP BY region
    ORDER BY total_revenue DESC
"#;

const MARGIN_BY_REGION_SQL: &str = r#"
    SELECT region, AVG(gross_margin) AS avg_gross_margin
    FROM sales_data
    GROUP BY region
    ORDER BY region
"#;

const AVG_PROCESSING_TIME_SQL: &str = r#"
    SELECT AVG(order_processing_time)
    FROM sales_data
"#;

const TOP_COUNTRIES_SQL: &str = r#"
    SELECT country, SUM(total_profit) AS total_profit
    FROM sales_data
    GROUP BY country
    ORDER BY total_profit DESC
    LIMIT $1
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAmount {
    pub region: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryAmount {
    pub country: String,
    pub amount: Decimal,
}

/// Aggregates over everything loaded so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub revenue_by_region: Vec<RegionAmount>,
    pub gross_margin_by_region: Vec<RegionAmount>,
    /// `None` when the table is empty.
    pub avg_processing_days: Option<Decimal>,
    pub top_countries_by_profit: Vec<CountryAmount>,
}

#[instrument(skip(pool))]
pub async fn summarize(pool: &PgPool) -> Result<SalesSummary> {
    let revenue: Vec<(String, Decimal)> = sqlx::query_as(REVENUE_BY_REGION_SQL)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;

    let margin: Vec<(String, Decimal)> = sqlx::query_as(MARGIN_BY_REGION_SQL)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;

    let avg_processing_days: Option<Decimal> = sqlx::query_scalar(AVG_PROCESSING_TIME_SQL)
        .fetch_one(pool)
        .await
        .map_err(query_error)?;

    let countries: Vec<(String, Decimal)> = sqlx::query_as(TOP_COUNTRIES_SQL)
        .bind(TOP_COUNTRIES)
        .fetch_all(pool)
        .await
        .map_err(query_error)?;

    info!(regions = revenue.len(), "Sales summary computed");

    Ok(SalesSummary {
        revenue_by_region: revenue
            .into_iter()
            .map(|(region, amount)| RegionAmount { region, amount })
            .collect(),
        gross_margin_by_region: margin
            .into_iter()
            .map(|(region, amount)| RegionAmount { region, amount })
            .collect(),
        avg_processing_days,
        top_countries_by_profit: countries
            .into_iter()
            .map(|(country, amount)| CountryAmount { country, amount })
            .collect(),
    })
}

fn query_error(err: sqlx::Error) -> EtlError {
    EtlError::Query(Box::new(err))
}

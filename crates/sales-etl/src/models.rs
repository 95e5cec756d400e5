//! Sales record types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date layout of the input files (`5/28/2010`, zero padding optional).
pub const INPUT_DATE_FORMAT: &str = "%m/%d/%Y";

/// Date layout written to cleaned CSV files (no zero padding).
pub const OUTPUT_DATE_FORMAT: &str = "%-m/%-d/%Y";

/// Date layout written to the database for parsed dates.
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Order priority decoded from the single-letter extract code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderPriority {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl OrderPriority {
    /// Decode a single-letter code. Anything unmapped is `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "L" => OrderPriority::Low,
            "M" => OrderPriority::Medium,
            "H" => OrderPriority::High,
            "C" => OrderPriority::Critical,
            _ => OrderPriority::Unknown,
        }
    }

    /// Decode an already-cleaned label, falling back to the letter codes.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Low" => OrderPriority::Low,
            "Medium" => OrderPriority::Medium,
            "High" => OrderPriority::High,
            "Critical" => OrderPriority::Critical,
            "Unknown" => OrderPriority::Unknown,
            other => OrderPriority::from_code(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPriority::Low => "Low",
            OrderPriority::Medium => "Medium",
            OrderPriority::High => "High",
            OrderPriority::Critical => "Critical",
            OrderPriority::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar date, or the raw text of a date the load stage could not parse
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SaleDate {
    Parsed(NaiveDate),
    Raw(String),
}

impl SaleDate {
    /// Parse `M/D/YYYY`, keeping the raw text when it does not match.
    pub fn lenient(value: &str) -> Self {
        match NaiveDate::parse_from_str(value, INPUT_DATE_FORMAT) {
            Ok(date) => SaleDate::Parsed(date),
            Err(_) => SaleDate::Raw(value.to_string()),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SaleDate::Parsed(date) => Some(*date),
            SaleDate::Raw(_) => None,
        }
    }

    /// `M/D/YYYY` for parsed dates, raw text otherwise.
    pub fn to_csv_field(&self) -> String {
        match self {
            SaleDate::Parsed(date) => date.format(OUTPUT_DATE_FORMAT).to_string(),
            SaleDate::Raw(raw) => raw.clone(),
        }
    }

    /// `YYYY-MM-DD` for parsed dates, raw text otherwise.
    pub fn to_sql_value(&self) -> String {
        match self {
            SaleDate::Parsed(date) => date.format(SQL_DATE_FORMAT).to_string(),
            SaleDate::Raw(raw) => raw.clone(),
        }
    }
}

impl From<NaiveDate> for SaleDate {
    fn from(date: NaiveDate) -> Self {
        SaleDate::Parsed(date)
    }
}

/// One sales transaction.
///
/// `order_id` is the natural key: at most one stored row per order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    pub region: String,
    pub country: String,
    pub item_type: String,
    pub sales_channel: String,
    pub order_priority: OrderPriority,
    pub order_date: SaleDate,
    pub order_id: i64,
    pub ship_date: SaleDate,
    pub units_sold: i64,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub total_revenue: Decimal,
    pub total_cost: Decimal,
    pub total_profit: Decimal,
    /// Days between order and shipment; negative when the dates are inverted.
    pub order_processing_time: i64,
    pub gross_margin: Decimal,
}

/// Whole days from `order_date` to `ship_date`.
pub fn processing_days(order_date: NaiveDate, ship_date: NaiveDate) -> i64 {
    (ship_date - order_date).num_days()
}

/// `total_profit / total_revenue`, or zero when there is no revenue.
pub fn gross_margin(total_profit: Decimal, total_revenue: Decimal) -> Decimal {
    if total_revenue.is_zero() {
        return Decimal::ZERO;
    }
    total_profit.checked_div(total_revenue).unwrap_or(Decimal::ZERO)
}

/// Counters reported by a load run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub rows_loaded: u64,
    pub duplicates_skipped: u64,
    pub total_rows_processed: u64,
}

impl LoadResult {
    /// Rows the sink did not insert are counted as duplicates.
    pub fn from_counts(total_rows_processed: u64, rows_loaded: u64) -> Self {
        Self {
            rows_loaded,
            duplicates_skipped: total_rows_processed.saturating_sub(rows_loaded),
            total_rows_processed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_priority_codes() {
        assert_eq!(OrderPriority::from_code("L"), OrderPriority::Low);
        assert_eq!(OrderPriority::from_code("M"), OrderPriority::Medium);
        assert_eq!(OrderPriority::from_code("H"), OrderPriority::High);
        assert_eq!(OrderPriority::from_code("C"), OrderPriority::Critical);
        assert_eq!(OrderPriority::from_code("X"), OrderPriority::Unknown);
        assert_eq!(OrderPriority::from_code(""), OrderPriority::Unknown);
        assert_eq!(OrderPriority::from_code("Low"), OrderPriority::Unknown);
    }

    #[test]
    fn test_priority_labels() {
        assert_eq!(OrderPriority::from_label("Critical"), OrderPriority::Critical);
        assert_eq!(OrderPriority::from_label("H"), OrderPriority::High);
        assert_eq!(OrderPriority::from_label("Urgent"), OrderPriority::Unknown);
        assert_eq!(OrderPriority::Medium.to_string(), "Medium");
    }

    #[test]
    fn test_processing_days() {
        let order = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let ship = NaiveDate::from_ymd_opt(2020, 1, 10).unwrap();
        assert_eq!(processing_days(order, ship), 9);
        assert_eq!(processing_days(ship, order), -9);
    }

    #[test]
    fn test_gross_margin_zero_revenue() {
        assert_eq!(gross_margin(dec("125.50"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(gross_margin(dec("-3"), dec("0.00")), Decimal::ZERO);
        assert_eq!(gross_margin(dec("25"), dec("100")), dec("0.25"));
    }

    #[test]
    fn test_sale_date_lenient() {
        let parsed = SaleDate::lenient("5/28/2010");
        assert_eq!(parsed.to_sql_value(), "2010-05-28");
        assert_eq!(parsed.to_csv_field(), "5/28/2010");

        let padded = SaleDate::lenient("05/08/2010");
        assert_eq!(padded.to_csv_field(), "5/8/2010");

        let raw = SaleDate::lenient("2010-05-28");
        assert_eq!(raw, SaleDate::Raw("2010-05-28".to_string()));
        assert_eq!(raw.to_sql_value(), "2010-05-28");
        assert!(raw.as_date().is_none());
    }

    #[test]
    fn test_load_result_counts() {
        let result = LoadResult::from_counts(2, 1);
        assert_eq!(result.duplicates_skipped, 1);
        assert_eq!(result.rows_loaded + result.duplicates_skipped, result.total_rows_processed);
    }
}

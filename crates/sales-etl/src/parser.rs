//! Record parsing
//!
//! One CSV record in, one [`Sale`] (or a [`MalformedRecord`] reason) out.
//! The two pipeline stages read different layouts and apply different date
//! policies:
//!
//! | Layout    | Fields        | Dates                          | Priority            |
//! |-----------|---------------|--------------------------------|---------------------|
//! | `Extract` | exactly 14    | strict `M/D/YYYY`              | letter code         |
//! | `Load`    | at least 16   | lenient, raw text kept as-is   | label or letter code|
//!
//! The extract layout computes processing time and gross margin; the load
//! layout reads them from the file.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::codec::COLUMNS;
use crate::models::{
    gross_margin, processing_days, OrderPriority, Sale, SaleDate, INPUT_DATE_FORMAT,
};

/// Field count of a raw extract line (`Region` .. `Total Profit`).
pub const EXTRACT_FIELD_COUNT: usize = 14;

/// Minimum field count of a cleaned line.
pub const LOAD_FIELD_COUNT: usize = 16;

const REGION: usize = 0;
const COUNTRY: usize = 1;
const ITEM_TYPE: usize = 2;
const SALES_CHANNEL: usize = 3;
const ORDER_PRIORITY: usize = 4;
const ORDER_DATE: usize = 5;
const ORDER_ID: usize = 6;
const SHIP_DATE: usize = 7;
const UNITS_SOLD: usize = 8;
const UNIT_PRICE: usize = 9;
const UNIT_COST: usize = 10;
const TOTAL_REVENUE: usize = 11;
const TOTAL_COST: usize = 12;
const TOTAL_PROFIT: usize = 13;
const ORDER_PROCESSING_TIME: usize = 14;
const GROSS_MARGIN: usize = 15;

/// Why a single record was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("invalid date in '{field}': {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid number in '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Which input layout a parser expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    /// Raw extract consumed by the transform stage
    Extract,
    /// Cleaned output consumed by the load stage
    Load,
}

/// Stateless parser for one [`RecordLayout`]
#[derive(Debug, Clone, Copy)]
pub struct RecordParser {
    layout: RecordLayout,
}

impl RecordParser {
    pub const fn new(layout: RecordLayout) -> Self {
        Self { layout }
    }

    pub const fn extract() -> Self {
        Self::new(RecordLayout::Extract)
    }

    pub const fn load() -> Self {
        Self::new(RecordLayout::Load)
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Split a raw line on commas and parse it.
    pub fn parse_line(&self, line: &str) -> Result<Sale, MalformedRecord> {
        let fields: Vec<&str> = line
            .trim_end_matches(['\r', '\n'])
            .split(',')
            .map(str::trim)
            .collect();
        self.parse_fields(&fields)
    }

    /// Parse an already-split record.
    pub fn parse_fields(&self, fields: &[&str]) -> Result<Sale, MalformedRecord> {
        match self.layout {
            RecordLayout::Extract => parse_extract(fields),
            RecordLayout::Load => parse_load(fields),
        }
    }
}

/// True for the column header line (`Region,Country,...`).
pub fn is_header(fields: &[&str]) -> bool {
    fields.len() >= 2 && fields[REGION] == COLUMNS[REGION] && fields[COUNTRY] == COLUMNS[COUNTRY]
}

fn parse_extract(fields: &[&str]) -> Result<Sale, MalformedRecord> {
    if fields.len() != EXTRACT_FIELD_COUNT {
        return Err(MalformedRecord::FieldCount {
            expected: EXTRACT_FIELD_COUNT,
            actual: fields.len(),
        });
    }

    let order_date = strict_date(fields, ORDER_DATE)?;
    let ship_date = strict_date(fields, SHIP_DATE)?;
    let total_revenue = decimal(fields, TOTAL_REVENUE)?;
    let total_profit = decimal(fields, TOTAL_PROFIT)?;

    Ok(Sale {
        region: fields[REGION].to_string(),
        country: fields[COUNTRY].to_string(),
        item_type: fields[ITEM_TYPE].to_string(),
        sales_channel: fields[SALES_CHANNEL].to_string(),
        order_priority: OrderPriority::from_code(fields[ORDER_PRIORITY]),
        order_date: SaleDate::Parsed(order_date),
        order_id: integer(fields, ORDER_ID)?,
        ship_date: SaleDate::Parsed(ship_date),
        units_sold: integer(fields, UNITS_SOLD)?,
        unit_price: decimal(fields, UNIT_PRICE)?,
        unit_cost: decimal(fields, UNIT_COST)?,
        total_revenue,
        total_cost: decimal(fields, TOTAL_COST)?,
        total_profit,
        order_processing_time: processing_days(order_date, ship_date),
        gross_margin: gross_margin(total_profit, total_revenue),
    })
}

// Dates are deliberately lenient here while the extract layout rejects them.
fn parse_load(fields: &[&str]) -> Result<Sale, MalformedRecord> {
    if fields.len() < LOAD_FIELD_COUNT {
        return Err(MalformedRecord::FieldCount {
            expected: LOAD_FIELD_COUNT,
            actual: fields.len(),
        });
    }

    Ok(Sale {
        region: fields[REGION].to_string(),
        country: fields[COUNTRY].to_string(),
        item_type: fields[ITEM_TYPE].to_string(),
        sales_channel: fields[SALES_CHANNEL].to_string(),
        order_priority: OrderPriority::from_label(fields[ORDER_PRIORITY]),
        order_date: SaleDate::lenient(fields[ORDER_DATE]),
        order_id: integer(fields, ORDER_ID)?,
        ship_date: SaleDate::lenient(fields[SHIP_DATE]),
        units_sold: integer(fields, UNITS_SOLD)?,
        unit_price: decimal(fields, UNIT_PRICE)?,
        unit_cost: decimal(fields, UNIT_COST)?,
        total_revenue: decimal(fields, TOTAL_REVENUE)?,
        total_cost: decimal(fields, TOTAL_COST)?,
        total_profit: decimal(fields, TOTAL_PROFIT)?,
        order_processing_time: integer(fields, ORDER_PROCESSING_TIME)?,
        gross_margin: decimal(fields, GROSS_MARGIN)?,
    })
}

fn strict_date(fields: &[&str], index: usize) -> Result<NaiveDate, MalformedRecord> {
    NaiveDate::parse_from_str(fields[index], INPUT_DATE_FORMAT).map_err(|_| {
        MalformedRecord::InvalidDate {
            field: COLUMNS[index],
            value: fields[index].to_string(),
        }
    })
}

fn integer(fields: &[&str], index: usize) -> Result<i64, MalformedRecord> {
    fields[index]
        .parse()
        .map_err(|_| MalformedRecord::InvalidNumber {
            field: COLUMNS[index],
            value: fields[index].to_string(),
        })
}

/// Plain (`651.21`) or exponent (`6.5121E+2`) notation.
fn decimal(fields: &[&str], index: usize) -> Result<Decimal, MalformedRecord> {
    let value = fields[index];
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| MalformedRecord::InvalidNumber {
            field: COLUMNS[index],
            value: value.to_string(),
        })
}

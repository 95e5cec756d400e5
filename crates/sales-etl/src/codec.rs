//! CSV encoding and streaming record reading
//!
//! Output files always carry the same 16-column header. Reading is
//! incremental: [`RecordReader`] pulls one line at a time from any tokio
//! `AsyncRead`, so a remote object is never materialized in memory.

use rust_decimal::{Decimal, RoundingStrategy};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::models::Sale;
use sales_etl_common::{EtlError, Result};

/// Column order of cleaned files.
pub const COLUMNS: [&str; 16] = [
    "Region",
    "Country",
    "Item Type",
    "Sales Channel",
    "Order Priority",
    "Order Date",
    "Order ID",
    "Ship Date",
    "Units Sold",
    "Unit Price",
    "Unit Cost",
    "Total Revenue",
    "Total Cost",
    "Total Profit",
    "Order Processing Time",
    "Gross Margin",
];

/// Decimal places for currency columns.
pub const CURRENCY_PLACES: u32 = 2;

/// Decimal places for the gross margin column.
pub const MARGIN_PLACES: u32 = 4;

/// Encode sales as a CSV document, header first.
pub fn encode(sales: &[Sale]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(COLUMNS)
        .map_err(|e| EtlError::Encode(e.to_string()))?;

    for sale in sales {
        writer
            .write_record(encode_record(sale))
            .map_err(|e| EtlError::Encode(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| EtlError::Encode(e.to_string()))
}

/// Field values of one output row, in [`COLUMNS`] order.
pub fn encode_record(sale: &Sale) -> [String; 16] {
    [
        sale.region.clone(),
        sale.country.clone(),
        sale.item_type.clone(),
        sale.sales_channel.clone(),
        sale.order_priority.to_string(),
        sale.order_date.to_csv_field(),
        sale.order_id.to_string(),
        sale.ship_date.to_csv_field(),
        sale.units_sold.to_string(),
        fixed(sale.unit_price, CURRENCY_PLACES),
        fixed(sale.unit_cost, CURRENCY_PLACES),
        fixed(sale.total_revenue, CURRENCY_PLACES),
        fixed(sale.total_cost, CURRENCY_PLACES),
        fixed(sale.total_profit, CURRENCY_PLACES),
        sale.order_processing_time.to_string(),
        fixed(sale.gross_margin, MARGIN_PLACES),
    ]
}

/// Format with exactly `places` decimals, rounding half away from zero.
pub fn fixed(value: Decimal, places: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded = Decimal::ZERO;
    }
    format!("{:.*}", places as usize, rounded)
}

/// Result of pulling the next record off a stream
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome<'a> {
    Record { line: u64, fields: Vec<&'a str> },
    /// The bytes of this record could not be decoded (e.g. invalid UTF-8).
    Undecodable { line: u64, reason: String },
    End,
}

/// Incremental line reader over an async byte stream.
///
/// Every physical line is split on its own, so a quote left open on one line
/// never spans into the next. No header handling and no fixed width: each
/// line is handed to the caller, which decides what to skip. Fields are
/// trimmed and blank lines are ignored.
pub struct RecordReader<R> {
    lines: BufReader<R>,
    splitter: csv::ReaderBuilder,
    buf: Vec<u8>,
    record: csv::StringRecord,
    line: u64,
}

impl<R> RecordReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(source: R) -> Self {
        let mut splitter = csv::ReaderBuilder::new();
        splitter
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All);

        Self {
            lines: BufReader::new(source),
            splitter,
            buf: Vec::new(),
            record: csv::StringRecord::new(),
            line: 0,
        }
    }

    /// Read the next record. I/O failures of the underlying stream are
    /// returned as `Err`; anything else is reported per line.
    pub async fn next_record(&mut self) -> std::io::Result<ReadOutcome<'_>> {
        loop {
            self.buf.clear();
            if self.lines.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(ReadOutcome::End);
            }
            self.line += 1;

            let text = match std::str::from_utf8(strip_line_ending(&self.buf)) {
                Ok(text) => text,
                Err(err) => {
                    return Ok(ReadOutcome::Undecodable {
                        line: self.line,
                        reason: err.to_string(),
                    })
                },
            };
            if text.trim().is_empty() {
                continue;
            }

            match self.splitter.from_reader(text.as_bytes()).read_record(&mut self.record) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(err) => {
                    return Ok(ReadOutcome::Undecodable {
                        line: self.line,
                        reason: err.to_string(),
                    })
                },
            }
        }

        Ok(ReadOutcome::Record {
            line: self.line,
            fields: self.record.iter().collect(),
        })
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::RecordParser;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_places() {
        assert_eq!(fixed("651.2".parse().unwrap(), 2), "651.20");
        assert_eq!(fixed("0.125".parse().unwrap(), 2), "0.13");
        assert_eq!(fixed("-0.125".parse().unwrap(), 2), "-0.13");
        assert_eq!(fixed("0.19386".parse().unwrap(), 4), "0.1939");
        assert_eq!(fixed("-0.0001".parse().unwrap(), 2), "0.00");
        assert_eq!(fixed(Decimal::ZERO, 4), "0.0000");
    }

    #[test]
    fn test_encode_header_and_rows() {
        let line = "Asia,Japan,Cereal,Offline,H,1/1/2020,42,1/10/2020,3,2.5,1,7.5,3,4.5";
        let sale = RecordParser::extract().parse_line(line).unwrap();

        let bytes = encode(&[sale]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "Asia,Japan,Cereal,Offline,High,1/1/2020,42,1/10/2020,3,2.50,1.00,7.50,3.00,4.50,9,0.6000"
        );
    }

    #[test]
    fn test_encode_empty_is_header_only() {
        let text = String::from_utf8(encode(&[]).unwrap()).unwrap();
        assert_eq!(text, format!("{}\n", COLUMNS.join(",")));
    }

    #[tokio::test]
    async fn test_reader_streams_records() {
        let data = "Region,Country\n\nEurope, Latvia \n\"Asia, East\",Japan\n";
        let mut reader = RecordReader::new(std::io::Cursor::new(data.as_bytes().to_vec()));

        let mut seen = Vec::new();
        loop {
            match reader.next_record().await.unwrap() {
                ReadOutcome::Record { fields, .. } => seen.push(fields.join("|")),
                ReadOutcome::Undecodable { reason, .. } => panic!("unexpected: {reason}"),
                ReadOutcome::End => break,
            }
        }

        assert_eq!(seen, vec!["Region|Country", "Europe|Latvia", "Asia, East|Japan"]);
    }

    #[tokio::test]
    async fn test_reader_reports_invalid_utf8_per_record() {
        let mut data = b"Europe,Latvia\n".to_vec();
        data.extend_from_slice(b"Asia,\xff\xfe\n");
        data.extend_from_slice(b"Europe,Malta\n");
        let mut reader = RecordReader::new(std::io::Cursor::new(data));

        assert!(matches!(reader.next_record().await.unwrap(), ReadOutcome::Record { .. }));
        assert!(matches!(
            reader.next_record().await.unwrap(),
            ReadOutcome::Undecodable { .. }
        ));
        match reader.next_record().await.unwrap() {
            ReadOutcome::Record { fields, .. } => assert_eq!(fields, vec!["Europe", "Malta"]),
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reader_confines_open_quote_to_its_line() {
        let data = "Europe,\"Latvia,Beverages\nAsia,Japan\r\nEurope,\"Malta, Gozo\"\n";
        let mut reader = RecordReader::new(std::io::Cursor::new(data.as_bytes().to_vec()));

        let mut seen = Vec::new();
        while let ReadOutcome::Record { line, fields } = reader.next_record().await.unwrap() {
            seen.push((line, fields.join("|")));
        }

        assert_eq!(
            seen,
            vec![
                (1, "Europe|Latvia,Beverages".to_string()),
                (2, "Asia|Japan".to_string()),
                (3, "Europe|Malta, Gozo".to_string()),
            ]
        );
    }

    fn cents() -> impl Strategy<Value = String> {
        (0i64..100_000_000).prop_map(|c| Decimal::new(c, 2).to_string())
    }

    prop_compose! {
        fn load_line()(
            text in proptest::collection::vec("[A-Za-z][A-Za-z ]{0,12}[A-Za-z]", 4),
            priority in prop_oneof![Just("Low"), Just("Medium"), Just("High"), Just("Critical"), Just("Unknown")],
            (m1, d1, y1) in (1u32..=12, 1u32..=28, 1990i32..2030),
            (m2, d2, y2) in (1u32..=12, 1u32..=28, 1990i32..2030),
            order_id in 1i64..999_999_999,
            units in 0i64..100_000,
            money in proptest::collection::vec(cents(), 5),
            days in -400i64..400,
            margin in (-10_000i64..10_000).prop_map(|m| Decimal::new(m, 4).to_string()),
        ) -> String {
            format!(
                "{},{},{},{},{priority},{m1}/{d1}/{y1},{order_id},{m2}/{d2}/{y2},{units},{},{},{},{},{},{days},{margin}",
                text[0], text[1], text[2], text[3], money[0], money[1], money[2], money[3], money[4],
            )
        }
    }

    proptest! {
        #[test]
        fn prop_load_line_round_trips(line in load_line()) {
            let sale = RecordParser::load().parse_line(&line).unwrap();
            let encoded = encode_record(&sale);
            let original: Vec<&str> = line.split(',').collect();

            prop_assert_eq!(original.len(), encoded.len());
            for (column, (before, after)) in COLUMNS.iter().zip(original.iter().zip(encoded.iter())) {
                if column.starts_with("Unit ") || column.starts_with("Total ") || *column == "Gross Margin" {
                    let before: Decimal = before.parse().unwrap();
                    let after: Decimal = after.parse().unwrap();
                    prop_assert_eq!(before, after, "column {}", column);
                } else {
                    prop_assert_eq!(*before, after.as_str(), "column {}", column);
                }
            }
        }
    }
}

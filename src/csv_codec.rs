//! CSV import/export of the record list.
//!
//! The column order is a fixed contract with spreadsheet users: url, title,
//! author, narrator, series, series number, year. Rows that are too short are
//! skipped instead of failing the whole import. Cell text is kept as written.

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use log::debug;

use crate::record::{Record, RecordField, parse_series_number, parse_year};

const BOM: &str = "\u{feff}";

/// Header label and record field of one exported column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvColumn {
    pub field: RecordField,
    pub label: String,
}

impl CsvColumn {
    pub fn new(field: RecordField, label: impl Into<String>) -> Self {
        Self {
            field,
            label: label.into(),
        }
    }
}

pub fn default_columns() -> Vec<CsvColumn> {
    vec![
        CsvColumn::new(RecordField::Url, "URL"),
        CsvColumn::new(RecordField::Title, "Title"),
        CsvColumn::new(RecordField::Author, "Author"),
        CsvColumn::new(RecordField::Narrator, "Narrator"),
        CsvColumn::new(RecordField::Series, "Series"),
        CsvColumn::new(RecordField::SeriesNumber, "Series Number"),
        CsvColumn::new(RecordField::Year, "Year"),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("writing CSV failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("flushing CSV output failed: {0}")]
    Flush(String),
    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Parses CSV text into records with fresh ids.
///
/// `has_header_row` skips the first non-blank row. Rows with fewer than
/// `expected_columns` cells are dropped, as are rows that cannot be read.
/// Quoted cells may span several lines.
pub fn decode(text: &str, has_header_row: bool, expected_columns: usize) -> Vec<Record> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(has_header_row)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                debug!("skipping unreadable CSV row: {err}");
                continue;
            }
        };
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if row.len() < expected_columns {
            debug!(
                "skipping CSV row at line {}: {} cell(s), expected {}",
                row.position().map(|pos| pos.line()).unwrap_or_default(),
                row.len(),
                expected_columns
            );
            continue;
        }
        records.push(record_from_row(&row));
    }
    records
}

fn record_from_row(row: &StringRecord) -> Record {
    let cell = |index: usize| row.get(index).unwrap_or_default();
    let series = cell(4);
    Record {
        url: cell(0).to_owned(),
        title: cell(1).to_owned(),
        author: cell(2).to_owned(),
        narrator: cell(3).to_owned(),
        series: (!series.trim().is_empty()).then(|| series.to_owned()),
        series_number: parse_series_number(cell(5)),
        year: parse_year(cell(6)),
        ..Record::empty()
    }
}

/// Renders records as CSV, prefixed with a UTF-8 byte-order mark so
/// spreadsheet tools pick the right encoding for non-ASCII names. Cells are
/// quoted only when they contain a comma, a quote or a line break.
pub fn encode(records: &[Record], columns: &[CsvColumn]) -> Result<String, EncodeError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(BOM.as_bytes().to_vec());

    writer.write_record(columns.iter().map(|column| column.label.as_str()))?;
    for record in records {
        writer.write_record(
            columns
                .iter()
                .map(|column| record.field_value(column.field)),
        )?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| EncodeError::Flush(err.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

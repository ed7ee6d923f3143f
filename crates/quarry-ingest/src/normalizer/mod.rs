//! Content normalization
//!
//! Turns raw CSV or JSON bytes into snake_cased records, infers a schema for
//! the batch and coerces every value to its field's inferred type.
//!
//! [`normalize`] never fails. Content that cannot be parsed in the hinted
//! format is stored as a single `raw_content` record with a warning.
//!
//! # Example
//!
//! ```
//! use quarry_ingest::normalizer::normalize;
//! use quarry_common::types::FieldType;
//!
//! let result = normalize(b"Observation Date,Value\n2024-01-01,\"1,234\"\n", "csv");
//! assert_eq!(result.row_count, 1);
//! assert_eq!(result.schema.type_of("observation_date"), Some(FieldType::Date));
//! assert_eq!(result.data[0]["value"], serde_json::json!(1234.0));
//! ```

mod coerce;
mod naming;
mod schema;

pub use coerce::{coerce, coerce_records};
pub use naming::snake_case;
pub use schema::{infer_schema, kind_of};

use quarry_common::types::{FieldSchema, FieldType, Schema};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// One normalized record; keys keep their source order
pub type Record = serde_json::Map<String, Value>;

/// Keys checked, in order, for the record list inside a JSON envelope
const ENVELOPE_KEYS: [&str; 6] = [
    "data",
    "results",
    "records",
    "items",
    "observations",
    "seriess",
];

pub const RAW_FALLBACK_WARNING: &str = "Could not parse content, stored as raw";
pub const LATIN1_WARNING: &str = "Fell back to latin-1 encoding";

/// Output of [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    pub data: Vec<Record>,
    pub schema: Schema,
    pub row_count: usize,
    pub warnings: Vec<String>,
}

impl NormalizedResult {
    fn from_records(mut data: Vec<Record>, warnings: Vec<String>) -> Self {
        let schema = infer_schema(&data);
        coerce_records(&mut data, &schema);
        Self {
            row_count: data.len(),
            data,
            schema,
            warnings,
        }
    }

    fn raw(content: &[u8]) -> Self {
        let mut record = Record::new();
        record.insert(
            "raw_content".to_string(),
            Value::String(String::from_utf8_lossy(content).into_owned()),
        );

        Self {
            data: vec![record],
            schema: Schema {
                fields: vec![FieldSchema {
                    name: "raw_content".to_string(),
                    field_type: FieldType::String,
                    nullable: false,
                }],
                row_count: 1,
            },
            row_count: 1,
            warnings: vec![RAW_FALLBACK_WARNING.to_string()],
        }
    }
}

/// Parse path selected by a format hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
    /// Try JSON, then CSV, then store raw
    Unknown,
}

impl Format {
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_lowercase().as_str() {
            "csv" => Format::Csv,
            "json" | "fred_series" => Format::Json,
            _ => Format::Unknown,
        }
    }
}

#[derive(Debug, Error)]
enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("no header columns")]
    NoColumns,
}

/// Normalize raw content according to a format hint
pub fn normalize(content: &[u8], format_hint: &str) -> NormalizedResult {
    let parsed = match Format::from_hint(format_hint) {
        Format::Csv => normalize_csv(content, false),
        Format::Json => normalize_json(content),
        Format::Unknown => normalize_json(content).or_else(|e| {
            debug!(error = %e, "JSON parse failed, trying CSV");
            normalize_csv(content, true)
        }),
    };

    parsed.unwrap_or_else(|e| {
        debug!(error = %e, format_hint, "Storing unparseable content as raw");
        NormalizedResult::raw(content)
    })
}

fn normalize_json(content: &[u8]) -> Result<NormalizedResult, ParseError> {
    let parsed: Value = serde_json::from_slice(content)?;

    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            let key = ENVELOPE_KEYS
                .iter()
                .find(|key| matches!(object.get(**key), Some(Value::Array(_))));
            match key.and_then(|key| object.remove(*key)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(object)],
            }
        }
        scalar => vec![scalar],
    };

    let records = items
        .into_iter()
        .map(|item| match item {
            Value::Object(object) => object
                .into_iter()
                .map(|(key, value)| (snake_case(&key), value))
                .collect(),
            other => {
                let mut record = Record::new();
                record.insert("value".to_string(), other);
                record
            }
        })
        .collect();

    Ok(NormalizedResult::from_records(records, Vec::new()))
}

/// Parse CSV; with `require_columns`, a header-less payload is an error
fn normalize_csv(content: &[u8], require_columns: bool) -> Result<NormalizedResult, ParseError> {
    let mut warnings = Vec::new();

    let text = match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => {
            warnings.push(LATIN1_WARNING.to_string());
            content.iter().map(|&b| char::from(b)).collect()
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(snake_case).collect();
    if columns.is_empty() || (columns.len() == 1 && reader.headers()?.get(0) == Some("")) {
        if require_columns {
            return Err(ParseError::NoColumns);
        }
        return Ok(NormalizedResult::from_records(Vec::new(), warnings));
    }

    let mut records = Vec::new();
    let mut ragged_rows = 0usize;

    for row in reader.records() {
        let row = row?;
        if row.len() > columns.len() {
            ragged_rows += 1;
        }

        let mut record = Record::new();
        for (index, column) in columns.iter().enumerate() {
            let value = match row.get(index) {
                Some("") | None => Value::Null,
                Some(cell) => Value::String(cell.to_string()),
            };
            record.insert(column.clone(), value);
        }
        records.push(record);
    }

    if ragged_rows > 0 {
        warnings.push(format!(
            "Dropped cells beyond the header in {ragged_rows} row(s)"
        ));
    }

    Ok(NormalizedResult::from_records(records, warnings))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_hint() {
        assert_eq!(Format::from_hint("CSV"), Format::Csv);
        assert_eq!(Format::from_hint("json"), Format::Json);
        assert_eq!(Format::from_hint("fred_series"), Format::Json);
        assert_eq!(Format::from_hint("xml"), Format::Unknown);
        assert_eq!(Format::from_hint(""), Format::Unknown);
    }

    #[test]
    fn test_csv_normalization() {
        let csv = b"Facility Name,Bed Count,Opened,Accredited\n\
                    General Hospital,\"1,200\",2001-05-01,yes\n\
                    Clinic,,1999-12-31,\n";
        let result = normalize(csv, "CSV");

        assert_eq!(result.row_count, 2);
        assert!(result.warnings.is_empty());
        assert_eq!(result.schema.type_of("facility_name"), Some(FieldType::String));
        assert_eq!(result.schema.type_of("bed_count"), Some(FieldType::Number));
        assert!(result.schema.field("bed_count").unwrap().nullable);
        assert_eq!(result.schema.type_of("opened"), Some(FieldType::Date));
        assert_eq!(result.data[0]["bed_count"], json!(1200.0));
        assert_eq!(result.data[1]["bed_count"], Value::Null);
        assert_eq!(result.data[1]["accredited"], Value::Null);
    }

    #[test]
    fn test_csv_ragged_rows() {
        let result = normalize(b"a,b,c\n1,2\n3,4,5,6\n", "csv");
        assert_eq!(result.row_count, 2);
        assert_eq!(result.data[0]["c"], Value::Null);
        assert_eq!(result.data[1].len(), 3);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("1 row"));
    }

    #[test]
    fn test_csv_latin1_fallback() {
        let mut csv = b"name,city\nJos".to_vec();
        csv.push(0xE9);
        csv.extend_from_slice(b",Montr\xE9al\n");

        let result = normalize(&csv, "csv");
        assert_eq!(result.warnings, vec![LATIN1_WARNING.to_string()]);
        assert_eq!(result.data[0]["name"], json!("José"));
        assert_eq!(result.data[0]["city"], json!("Montréal"));
    }

    #[test]
    fn test_json_envelope_keys() {
        let body = json!({
            "series_id": "GDP",
            "series_info": {"id": "GDP", "title": "Gross Domestic Product"},
            "observations": [
                {"realtime_start": "2024-01-01", "date": "2023-10-01", "value": "27,956.998"},
                {"realtime_start": "2024-01-01", "date": "2024-01-01", "value": "."}
            ]
        });
        let result = normalize(body.to_string().as_bytes(), "json");

        assert_eq!(result.row_count, 2);
        assert_eq!(result.schema.type_of("value"), Some(FieldType::Number));
        assert_eq!(result.data[0]["value"], json!(27956.998));
        assert_eq!(result.data[1]["value"], Value::Null);
        assert_eq!(result.data[0]["date"], json!("2023-10-01"));
    }

    #[test]
    fn test_json_object_without_envelope_is_single_record() {
        let body = br#"{"success": true, "result": {"name": "hospitals"}, "helpText": "x"}"#;
        let result = normalize(body, "json");

        assert_eq!(result.row_count, 1);
        assert_eq!(result.data[0]["success"], json!(true));
        assert_eq!(result.data[0]["help_text"], json!("x"));
        assert_eq!(result.schema.type_of("result"), Some(FieldType::Object));
    }

    #[test]
    fn test_json_scalars_and_mixed_lists() {
        let result = normalize(b"42", "json");
        assert_eq!(result.data[0]["value"], json!(42));

        let result = normalize(br#"[{"Key Name": 1}, 2, "three"]"#, "json");
        assert_eq!(result.row_count, 3);
        assert_eq!(result.data[0]["key_name"], json!(1));
        assert_eq!(result.data[1]["value"], json!(2));
        assert!(result.schema.field("key_name").unwrap().nullable);
    }

    #[test]
    fn test_envelope_key_must_hold_a_list() {
        let body = br#"{"data": "not a list", "items": [{"a": 1}]}"#;
        let result = normalize(body, "json");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.data[0]["a"], json!(1));
    }

    #[test]
    fn test_unknown_hint_tries_json_then_csv() {
        let result = normalize(br#"[{"a": 1}]"#, "xml");
        assert_eq!(result.data[0]["a"], json!(1));

        let result = normalize(b"x,y\n1,2\n", "");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.data[0]["y"], json!(2.0));
    }

    #[test]
    fn test_raw_fallback() {
        let result = normalize(b"", "zip");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.warnings, vec![RAW_FALLBACK_WARNING.to_string()]);
        assert_eq!(result.data[0]["raw_content"], json!(""));

        let result = normalize(b"<html>oops", "json");
        assert_eq!(result.data[0]["raw_content"], json!("<html>oops"));
        assert_eq!(result.schema.type_of("raw_content"), Some(FieldType::String));
    }

    #[test]
    fn test_empty_csv_with_csv_hint_yields_no_rows() {
        let result = normalize(b"", "csv");
        assert_eq!(result.row_count, 0);
        assert!(result.schema.fields.is_empty());
    }
}

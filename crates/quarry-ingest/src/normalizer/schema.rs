//! Schema inference over untyped record batches

use super::Record;
use quarry_common::types::{FieldSchema, FieldType, Schema};
use serde_json::Value;

/// Classify a single value; `None` means null (JSON null or empty string)
pub fn kind_of(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Number(n) if n.is_f64() => Some(FieldType::Number),
        Value::Number(_) => Some(FieldType::Integer),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) if looks_like_date(s) => Some(FieldType::Date),
        Value::String(s) if parses_as_number(s) => Some(FieldType::Number),
        Value::String(_) => Some(FieldType::String),
        Value::Array(_) => Some(FieldType::Array),
        Value::Object(_) => Some(FieldType::Object),
    }
}

/// `YYYY-MM-DD` prefix
fn looks_like_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 10
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
}

/// Float syntax once thousands separators are removed
pub(crate) fn parses_as_number(s: &str) -> bool {
    s.replace(',', "").trim().parse::<f64>().is_ok()
}

/// Per-field tally in first-seen kind order
#[derive(Default)]
struct FieldTally {
    kinds: Vec<(FieldType, usize)>,
    nulls: usize,
    present: usize,
}

impl FieldTally {
    fn observe(&mut self, value: &Value) {
        self.present += 1;
        match kind_of(value) {
            None => self.nulls += 1,
            Some(kind) => match self.kinds.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, count)) => *count += 1,
                None => self.kinds.push((kind, 1)),
            },
        }
    }

    /// Most frequent kind; the earliest observed wins a tie
    fn primary(&self) -> FieldType {
        let mut best: Option<(FieldType, usize)> = None;
        for &(kind, count) in &self.kinds {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((kind, count));
            }
        }
        best.map_or(FieldType::String, |(kind, _)| kind)
    }
}

/// Infer field types and nullability for a batch of records
///
/// Fields appear in the order they are first seen. A field is nullable when
/// any record holds a null for it or lacks it entirely. Fields that are only
/// ever null are typed as string.
pub fn infer_schema(records: &[Record]) -> Schema {
    let mut order: Vec<String> = Vec::new();
    let mut tallies: std::collections::HashMap<String, FieldTally> =
        std::collections::HashMap::new();

    for record in records {
        for (name, value) in record {
            let tally = tallies.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                FieldTally::default()
            });
            tally.observe(value);
        }
    }

    let fields = order
        .into_iter()
        .filter_map(|name| {
            let tally = tallies.remove(&name)?;
            Some(FieldSchema {
                field_type: tally.primary(),
                nullable: tally.nulls > 0 || tally.present < records.len(),
                name,
            })
        })
        .collect();

    Schema {
        fields,
        row_count: records.len(),
    }
}

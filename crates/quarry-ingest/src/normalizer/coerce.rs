//! Value coercion to inferred field types

use super::Record;
use quarry_common::types::{FieldType, Schema};
use serde_json::{Number, Value};

/// Coerce one value to `target`; unconvertible values become null
pub fn coerce(value: &Value, target: FieldType) -> Value {
    if is_blank(value) {
        return Value::Null;
    }

    match target {
        FieldType::Integer => to_integer(value),
        FieldType::Number => to_number(value),
        FieldType::Boolean => to_boolean(value),
        FieldType::Date => match value {
            Value::String(s) => Value::String(s.chars().take(10).collect()),
            other => Value::String(other.to_string()),
        },
        FieldType::String | FieldType::Array | FieldType::Object => value.clone(),
    }
}

/// Coerce every field present in each record to its schema type
pub fn coerce_records(records: &mut [Record], schema: &Schema) {
    for record in records.iter_mut() {
        for (name, value) in record.iter_mut() {
            if let Some(target) = schema.type_of(name) {
                *value = coerce(value, target);
            }
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.replace(',', ""),
        other => other.to_string(),
    }
}

fn to_integer(value: &Value) -> Value {
    if let Value::Number(n) = value {
        if n.is_i64() || n.is_u64() {
            return value.clone();
        }
    }

    let text = text_of(value);
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }

    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map_or(Value::Null, |f| Value::from(f.trunc() as i64))
}

fn to_number(value: &Value) -> Value {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        other => text_of(other).trim().parse::<f64>().ok(),
    };

    parsed
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

fn to_boolean(value: &Value) -> Value {
    if let Value::Bool(_) = value {
        return value.clone();
    }

    let text = match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    match text.as_str() {
        "true" | "yes" | "1" | "y" => Value::Bool(true),
        "false" | "no" | "0" | "n" => Value::Bool(false),
        _ => Value::Null,
    }
}

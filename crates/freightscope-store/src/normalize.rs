//! Adapters from raw store envelopes to canonical shapes.
//!
//! The store's response shape is not firmly contracted: rows may arrive as a
//! bare array, under `groups`, `data`, `rows`, `buckets`, `result(s)`, or
//! inside an `aggregations` wrapper, and row keys vary between producers.
//! Each call site goes through exactly one adapter here instead of sniffing
//! shapes itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Container keys searched for row arrays, in priority order.
const ROW_KEYS: &[&str] = &[
    "groups", "rows", "buckets", "results", "result", "data", "items", "series",
];
const GROUP_KEYS: &[&str] = &["group", "key", "label", "_id", "name", "date", "period"];
const SECONDARY_KEYS: &[&str] = &["secondary_group", "secondary", "sub_group", "subgroup"];
const VALUE_KEYS: &[&str] = &["value", "total", "result", "sum", "avg", "metric", "amount"];
const COUNT_KEYS: &[&str] = &["count", "doc_count", "records", "n"];

/// Envelopes deeper than this are not searched.
const MAX_DEPTH: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Canonical shapes
// ─────────────────────────────────────────────────────────────────────────────

/// One row of a grouped aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    pub value: f64,
    pub count: u64,
}

/// One entry of a field's top values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

/// Cardinality and coverage of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProfile {
    pub field: String,
    pub distinct_count: u64,
    pub total_records: u64,
    /// Records where the field is present and non-null.
    pub populated: u64,
    pub top_values: Vec<ValueCount>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapters
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize a group-and-aggregate envelope.
///
/// A scalar envelope such as `{"value": 42}` becomes a single row with group
/// `"total"`.
pub fn groups(envelope: &Value) -> Result<Vec<GroupRow>> {
    check_error(envelope)?;

    if let Some(rows) = find_rows(envelope, 0) {
        return Ok(rows.iter().filter_map(group_row).collect());
    }

    if let Some(obj) = envelope.as_object()
        && let Some(value) = first_number(obj, VALUE_KEYS).or_else(|| first_number(obj, COUNT_KEYS))
    {
        let count = first_number(obj, COUNT_KEYS).unwrap_or(0.0);
        return Ok(vec![GroupRow {
            group: "total".to_string(),
            secondary: None,
            value,
            count: count.max(0.0) as u64,
        }]);
    }

    Err(StoreError::UnexpectedShape(describe(envelope)))
}

/// Normalize a field-exploration envelope.
pub fn field_profile(field: &str, envelope: &Value) -> Result<FieldProfile> {
    check_error(envelope)?;

    let body = unwrap_object(envelope, &["field_profile", "profile", "data", "result"]);
    let Some(obj) = body.as_object() else {
        return Err(StoreError::UnexpectedShape(describe(envelope)));
    };

    let top_values: Vec<ValueCount> = ["top_values", "values", "buckets", "top"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
        .map(|rows| rows.iter().filter_map(value_count).collect())
        .unwrap_or_default();

    let distinct_count = first_number(obj, &["distinct_count", "cardinality", "unique_count", "distinct"])
        .map(|n| n as u64)
        .unwrap_or(top_values.len() as u64);
    let total_records = first_number(obj, &["total_records", "total", "record_count", "doc_count"])
        .map(|n| n as u64)
        .unwrap_or_else(|| top_values.iter().map(|v| v.count).sum());
    let populated = first_number(obj, &["populated", "non_null", "filled", "present"])
        .map(|n| n as u64)
        .unwrap_or(total_records);

    let field = obj
        .get("field")
        .and_then(Value::as_str)
        .unwrap_or(field)
        .to_string();

    Ok(FieldProfile {
        field,
        distinct_count,
        total_records,
        populated: populated.min(total_records),
        top_values,
    })
}

/// Normalize a raw-values envelope into plain numbers.
///
/// Non-numeric entries are skipped.
pub fn values(envelope: &Value) -> Result<Vec<f64>> {
    check_error(envelope)?;

    let rows = match envelope {
        Value::Array(rows) => Some(rows),
        Value::Object(obj) => ["values", "data", "rows", "results", "items"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .or_else(|| find_rows(envelope, 0)),
        _ => None,
    };

    let Some(rows) = rows else {
        return Err(StoreError::UnexpectedShape(describe(envelope)));
    };

    Ok(rows
        .iter()
        .filter_map(|row| match row {
            Value::Object(obj) => first_number(obj, VALUE_KEYS),
            other => as_number(other),
        })
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn check_error(envelope: &Value) -> Result<()> {
    match envelope.get("error") {
        Some(Value::String(message)) => Err(StoreError::Remote(message.clone())),
        Some(Value::Object(obj)) => Err(StoreError::Remote(
            obj.get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown store error")
                .to_string(),
        )),
        _ => Ok(()),
    }
}

/// Locate the row array inside an envelope.
fn find_rows(envelope: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth > MAX_DEPTH {
        return None;
    }
    match envelope {
        Value::Array(rows) => Some(rows),
        Value::Object(obj) => {
            for key in ROW_KEYS {
                match obj.get(*key) {
                    Some(Value::Array(rows)) => return Some(rows),
                    Some(nested @ Value::Object(_)) => {
                        if let Some(rows) = find_rows(nested, depth + 1) {
                            return Some(rows);
                        }
                    }
                    _ => {}
                }
            }
            // {aggregations: {<name>: {buckets: [...]}}}
            obj.get("aggregations")
                .and_then(Value::as_object)
                .and_then(|aggs| aggs.values().find_map(|agg| find_rows(agg, depth + 1)))
        }
        _ => None,
    }
}

fn unwrap_object<'a>(envelope: &'a Value, keys: &[&str]) -> &'a Value {
    let mut current = envelope;
    for _ in 0..MAX_DEPTH {
        let next = keys
            .iter()
            .find_map(|key| current.get(*key).filter(|v| v.is_object()));
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn group_row(row: &Value) -> Option<GroupRow> {
    let obj = row.as_object()?;

    let group = first_label(obj, GROUP_KEYS).unwrap_or_else(|| "(none)".to_string());
    let secondary = first_label(obj, SECONDARY_KEYS);
    let count = first_number(obj, COUNT_KEYS);
    let value = first_number(obj, VALUE_KEYS).or(count)?;

    Some(GroupRow {
        group,
        secondary,
        value,
        count: count.unwrap_or(0.0).max(0.0) as u64,
    })
}

fn value_count(row: &Value) -> Option<ValueCount> {
    match row {
        Value::Object(obj) => Some(ValueCount {
            value: first_label(obj, &["value", "key", "label", "_id", "name"])
                .unwrap_or_else(|| "(none)".to_string()),
            count: first_number(obj, COUNT_KEYS).unwrap_or(0.0).max(0.0) as u64,
        }),
        // ["UPS", 120]
        Value::Array(pair) if pair.len() == 2 => Some(ValueCount {
            value: label(&pair[0])?,
            count: as_number(&pair[1])?.max(0.0) as u64,
        }),
        _ => None,
    }
}

fn first_label(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| obj.get(*key).and_then(label))
}

fn first_number(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| obj.get(*key).and_then(as_number))
}

fn label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("(none)".to_string()),
        _ => None,
    }
}

/// Numbers, numeric strings, and `{value: n}` wrappers.
fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(obj) => obj.get("value").and_then(as_number),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn describe(envelope: &Value) -> String {
    match envelope {
        Value::Object(obj) => {
            let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(_) => "array".to_string(),
        Value::Null => "null".to_string(),
        other => format!("scalar {}", other),
    }
}

//! In-memory store over a file of shipment records.
//!
//! Evaluates the same primitives as a remote store against a JSON array or
//! NDJSON file. Used for local `ask` runs and end-to-end tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, TimeDelta};
use serde_json::{Map, Value, json};

use crate::error::{Result, StoreError};
use crate::period::DateRange;
use crate::query::{AggregateQuery, Aggregation, Bucket, FieldQuery, Filters, ValuesQuery};
use crate::store::AnalyticsStore;

pub const DEFAULT_DATE_FIELD: &str = "ship_date";

type Record = Map<String, Value>;

/// Store backed by records held in memory.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    records: Vec<Record>,
    date_field: String,
}

impl DatasetStore {
    /// Build from JSON values; every value must be an object.
    pub fn new(records: Vec<Value>) -> Result<Self> {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Value::Object(obj) => Ok(obj),
                other => Err(StoreError::Dataset(format!(
                    "record {} is not an object: {}",
                    i, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            records,
            date_field: DEFAULT_DATE_FIELD.to_string(),
        })
    }

    /// Field holding each record's date (`YYYY-MM-DD` prefix).
    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = field.into();
        self
    }

    /// Load a JSON array, a `{records|shipments|data: [...]}` wrapper, or NDJSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let store = Self::parse(&text)?;
        tracing::info!(
            path = %path.display(),
            records = store.len(),
            "Loaded dataset"
        );
        Ok(store)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Array(rows)) => return Self::new(rows),
                Ok(Value::Object(mut obj)) => {
                    for key in ["records", "shipments", "data"] {
                        if let Some(Value::Array(rows)) = obj.remove(key) {
                            return Self::new(rows);
                        }
                    }
                    // A single-line NDJSON file is also a lone object.
                    return Self::new(vec![Value::Object(obj)]);
                }
                Ok(_) => {
                    return Err(StoreError::Dataset(
                        "dataset must be an array of records".to_string(),
                    ));
                }
                // Fall through to NDJSON: several objects are not one JSON document.
                Err(_) => {}
            }
        }

        let rows = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<Value>(line)
                    .map_err(|e| StoreError::Dataset(format!("line {}: {}", n + 1, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(rows)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_date(&self, record: &Record) -> Option<NaiveDate> {
        let raw = record.get(&self.date_field)?.as_str()?;
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    fn matching<'a>(
        &'a self,
        customer_id: &'a str,
        range: Option<DateRange>,
        filters: &'a Filters,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |record| {
            if let Some(owner) = record.get("customer_id").and_then(label)
                && owner != customer_id
            {
                return false;
            }
            if let Some(range) = range {
                match self.record_date(record) {
                    Some(date) if range.contains(date) => {}
                    _ => return false,
                }
            }
            filters
                .iter()
                .all(|(field, expected)| record.get(field).is_some_and(|v| values_match(v, expected)))
        })
    }
}

#[async_trait]
impl AnalyticsStore for DatasetStore {
    async fn aggregate(&self, query: AggregateQuery) -> Result<Value> {
        query.validate()?;

        let mut buckets: BTreeMap<(String, Option<String>), Accumulator> = BTreeMap::new();

        for record in self.matching(&query.customer_id, query.range, &query.filters) {
            let group = if let Some(bucket) = query.bucket {
                match self.record_date(record) {
                    Some(date) => bucket_label(bucket, date),
                    None => continue,
                }
            } else if let Some(field) = &query.group_by {
                record
                    .get(field)
                    .and_then(label)
                    .unwrap_or_else(|| "(none)".to_string())
            } else {
                "total".to_string()
            };
            let secondary = query.secondary_group_by.as_ref().map(|field| {
                record
                    .get(field)
                    .and_then(label)
                    .unwrap_or_else(|| "(none)".to_string())
            });

            let entry = buckets.entry((group, secondary)).or_default();
            match (&query.metric, query.aggregation) {
                (_, Aggregation::Count) => entry.count += 1,
                (Some(metric), Aggregation::CountDistinct) => {
                    if let Some(v) = record.get(metric).and_then(label) {
                        entry.count += 1;
                        entry.distinct.insert(v);
                    }
                }
                (Some(metric), _) => {
                    if let Some(v) = record.get(metric).and_then(number) {
                        entry.add(v);
                    }
                }
                (None, _) => {}
            }
        }

        let mut rows: Vec<(String, Option<String>, f64, u64)> = buckets
            .into_iter()
            .filter(|(_, acc)| acc.count > 0)
            .map(|((group, secondary), acc)| {
                let value = acc.finish(query.aggregation);
                (group, secondary, value, acc.count)
            })
            .collect();

        if query.bucket.is_none() {
            rows.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        let groups: Vec<Value> = rows
            .into_iter()
            .map(|(group, secondary, value, count)| {
                let mut row = json!({"group": group, "value": value, "count": count});
                if let Some(secondary) = secondary {
                    row["secondary_group"] = Value::String(secondary);
                }
                row
            })
            .collect();

        Ok(json!({ "groups": groups }))
    }

    async fn explore_field(&self, query: FieldQuery) -> Result<Value> {
        let mut total = 0u64;
        let mut populated = 0u64;
        let mut counts: HashMap<String, u64> = HashMap::new();

        for record in self.matching(&query.customer_id, query.range, &query.filters) {
            total += 1;
            let present = record
                .get(&query.field)
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .and_then(label);
            if let Some(value) = present {
                populated += 1;
                *counts.entry(value).or_default() += 1;
            }
        }

        let distinct = counts.len();
        let mut top: Vec<(String, u64)> = counts.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(query.limit);

        Ok(json!({
            "field": query.field,
            "distinct_count": distinct,
            "total_records": total,
            "populated": populated,
            "top_values": top
                .into_iter()
                .map(|(value, count)| json!({"value": value, "count": count}))
                .collect::<Vec<_>>(),
        }))
    }

    async fn fetch_values(&self, query: ValuesQuery) -> Result<Value> {
        let mut dated: Vec<(Option<NaiveDate>, f64)> = self
            .matching(&query.customer_id, query.range, &query.filters)
            .filter_map(|record| {
                let value = record.get(&query.metric).and_then(number)?;
                Some((self.record_date(record), value))
            })
            .collect();
        dated.sort_by_key(|(date, _)| *date);

        let mut values: Vec<f64> = dated.into_iter().map(|(_, v)| v).collect();
        if let Some(limit) = query.limit {
            values.truncate(limit);
        }
        Ok(json!({ "values": values }))
    }

    fn name(&self) -> &str {
        "dataset"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Accumulator {
    sum: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
    distinct: BTreeSet<String>,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn finish(&self, aggregation: Aggregation) -> f64 {
        match aggregation {
            Aggregation::Sum => self.sum,
            Aggregation::Avg if self.count > 0 => self.sum / self.count as f64,
            Aggregation::Avg => 0.0,
            Aggregation::Count => self.count as f64,
            Aggregation::CountDistinct => self.distinct.len() as f64,
            Aggregation::Min => self.min.unwrap_or(0.0),
            Aggregation::Max => self.max.unwrap_or(0.0),
        }
    }
}

fn bucket_label(bucket: Bucket, date: NaiveDate) -> String {
    match bucket {
        Bucket::Day => date.to_string(),
        Bucket::Week => {
            let monday = date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()));
            monday.to_string()
        }
        Bucket::Month => format!("{:04}-{:02}", date.year(), date.month()),
    }
}

fn label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (label(actual), label(expected)) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(&b),
        _ => false,
    }
}

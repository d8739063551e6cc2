//! Typed queries accepted by an [`AnalyticsStore`](crate::AnalyticsStore).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::period::DateRange;

/// Equality filters: field name to required value.
pub type Filters = BTreeMap<String, serde_json::Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Aggregation & Bucketing
// ─────────────────────────────────────────────────────────────────────────────

/// How grouped values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "count_distinct",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }

    /// Whether the aggregation needs a metric field.
    pub fn needs_metric(&self) -> bool {
        !matches!(self, Aggregation::Count)
    }

    /// Human label used in titles ("Total", "Average", ...).
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Sum => "Total",
            Aggregation::Avg => "Average",
            Aggregation::Count => "Count of",
            Aggregation::CountDistinct => "Distinct",
            Aggregation::Min => "Minimum",
            Aggregation::Max => "Maximum",
        }
    }
}

impl FromStr for Aggregation {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "total" => Ok(Aggregation::Sum),
            "avg" | "average" | "mean" => Ok(Aggregation::Avg),
            "count" => Ok(Aggregation::Count),
            "count_distinct" | "distinct" | "cardinality" => Ok(Aggregation::CountDistinct),
            "min" | "minimum" => Ok(Aggregation::Min),
            "max" | "maximum" => Ok(Aggregation::Max),
            other => Err(StoreError::invalid_query(format!(
                "unknown aggregation '{}' (expected sum, avg, count, count_distinct, min, max)",
                other
            ))),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time bucket for series queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Day,
    Week,
    Month,
}

impl FromStr for Bucket {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Bucket::Day),
            "week" | "weekly" => Ok(Bucket::Week),
            "month" | "monthly" => Ok(Bucket::Month),
            other => Err(StoreError::invalid_query(format!(
                "unknown interval '{}' (expected day, week, month)",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

/// Group-and-aggregate query.
///
/// Without `group_by` or `bucket` the store returns a single row holding the
/// overall aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub customer_id: String,
    pub aggregation: Aggregation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_group_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<Bucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: Filters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AggregateQuery {
    pub fn new(customer_id: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            customer_id: customer_id.into(),
            aggregation,
            metric: None,
            group_by: None,
            secondary_group_by: None,
            bucket: None,
            range: None,
            filters: Filters::new(),
            limit: None,
        }
    }

    pub fn with_metric(mut self, metric: Option<impl Into<String>>) -> Self {
        self.metric = metric.map(Into::into);
        self
    }

    pub fn with_group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by = Some(field.into());
        self
    }

    pub fn with_secondary_group_by(mut self, field: Option<impl Into<String>>) -> Self {
        self.secondary_group_by = field.map(Into::into);
        self
    }

    pub fn with_bucket(mut self, bucket: Bucket) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject queries the store could not answer meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.aggregation.needs_metric() && self.metric.is_none() {
            return Err(StoreError::invalid_query(format!(
                "aggregation '{}' requires a metric field",
                self.aggregation
            )));
        }
        if self.secondary_group_by.is_some() && self.group_by.is_none() {
            return Err(StoreError::invalid_query(
                "secondary_group_by requires group_by",
            ));
        }
        Ok(())
    }
}

/// Field cardinality / coverage / top-values query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub customer_id: String,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: Filters,
    pub limit: usize,
}

impl FieldQuery {
    pub fn new(customer_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            field: field.into(),
            range: None,
            filters: Filters::new(),
            limit: 10,
        }
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Raw numeric values of one metric, for local statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesQuery {
    pub customer_id: String,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: Filters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ValuesQuery {
    pub fn new(customer_id: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            metric: metric.into(),
            range: None,
            filters: Filters::new(),
            limit: None,
        }
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

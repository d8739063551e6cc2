//! Investigation tools and the executor that dispatches them.
//!
//! Every tool turns a JSON input into one or more store queries and reduces
//! the normalized answers to a JSON result. The executor never fails: unknown
//! tools, invalid inputs and store errors all come back as an object carrying
//! an `error` key next to the tool's empty result shape, so the reasoning
//! backend can read the failure and try something else.

mod aggregate;
mod anomaly;
mod explore;
mod series;
mod spatial;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use freightscope_store::{
    AggregateQuery, Aggregation, AnalyticsStore, DateRange, Filters, GroupRow, Period,
    SharedStore,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::{ParameterError, ToolError, ToolResult};

pub use aggregate::{ComparePeriods, CompareMetrics, PreviewAggregation};
pub use anomaly::{
    AnalyzeRootCause, DetectAnomalies, OutlierScan, Sensitivity, ZScore, find_outliers,
};
pub use explore::ExploreField;
pub use series::{GetDailyActivity, GetSummaryStatistics, GetTrend, Summary, summarize};
pub use spatial::{GetFlowData, GetGeographicData, GetHierarchicalData};

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Per-investigation context handed to every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Tenant whose data is queried.
    pub customer_id: String,
    /// Reference date for resolving symbolic periods.
    pub today: NaiveDate,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(customer_id: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            customer_id: customer_id.into(),
            today,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Handler
// ─────────────────────────────────────────────────────────────────────────────

/// One investigation tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name matching the catalog entry.
    fn name(&self) -> &'static str;

    /// Result shape returned, with an `error` key added, when the tool fails.
    fn empty_result(&self) -> Value;

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Typed access to tool input fields.
pub trait ParamExt {
    /// Get a required, non-empty string parameter.
    fn required_str(&self, name: &'static str, hint: &'static str) -> Result<&str, ParameterError>;

    /// Get an optional string parameter; blank strings count as absent.
    fn optional_str(&self, name: &str) -> Option<&str>;

    /// Get an optional u64 parameter with default. Numeric strings are accepted.
    fn optional_u64(&self, name: &str, default: u64) -> u64;

    /// Get a list of strings, given either as an array or a comma-separated string.
    fn optional_str_list(&self, name: &str) -> Option<Vec<String>>;
}

impl ParamExt for Value {
    fn required_str(&self, name: &'static str, hint: &'static str) -> Result<&str, ParameterError> {
        self.optional_str(name)
            .ok_or_else(|| ParameterError::missing(name, hint))
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn optional_u64(&self, name: &str, default: u64) -> u64 {
        match self.get(name) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn optional_str_list(&self, name: &str) -> Option<Vec<String>> {
        let items: Vec<String> = match self.get(name)? {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .collect(),
            Value::String(s) => s.split(',').map(|s| s.trim().to_string()).collect(),
            _ => return None,
        };

        let mut seen = Vec::with_capacity(items.len());
        for item in items {
            if !item.is_empty() && !seen.contains(&item) {
                seen.push(item);
            }
        }
        (!seen.is_empty()).then_some(seen)
    }
}

/// Parse the `period` input, falling back to `default`.
pub(crate) fn parse_period(input: &Value, default: &str) -> ToolResult<Period> {
    let raw = input.optional_str("period").unwrap_or(default);
    Period::parse(raw).map_err(|_| {
        ParameterError::invalid(
            "period",
            raw,
            "use today, yesterday, lastN (e.g. last30), this_month, last_month, this_year or all",
        )
        .into()
    })
}

/// Parse the `period` input and require it to resolve to a date range.
pub(crate) fn bounded_range(
    input: &Value,
    default: &str,
    ctx: &ToolContext,
    why: &str,
) -> ToolResult<(Period, DateRange)> {
    let period = parse_period(input, default)?;
    let range = period
        .resolve(ctx.today)
        .ok_or_else(|| ParameterError::invalid("period", period.label(), why))?;
    Ok((period, range))
}

/// Current and comparison ranges from `period` and `compare_to`.
///
/// `compare_to` is `previous` (the preceding range of equal length) or any
/// symbolic period.
pub(crate) fn comparison_ranges(
    input: &Value,
    ctx: &ToolContext,
) -> ToolResult<(Period, DateRange, DateRange)> {
    let (period, current) = bounded_range(
        input,
        "last30",
        ctx,
        "comparisons need a bounded period such as last30 or this_month",
    )?;

    let previous = match input.optional_str("compare_to") {
        None | Some("previous") | Some("prior") | Some("previous_period") => current.previous(),
        Some(other) => Period::parse(other)
            .ok()
            .and_then(|p| p.resolve(ctx.today))
            .ok_or_else(|| {
                ParameterError::invalid(
                    "compare_to",
                    other,
                    "use 'previous' or a bounded symbolic period",
                )
            })?,
    };
    Ok((period, current, previous))
}

/// Parse `filters` as an object of equality filters.
pub(crate) fn parse_filters(input: &Value) -> ToolResult<Filters> {
    match input.get("filters") {
        None | Some(Value::Null) => Ok(Filters::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        Some(other) => Err(ParameterError::invalid(
            "filters",
            other.to_string(),
            "expected an object such as {\"carrier\": \"UPS\"}",
        )
        .into()),
    }
}

/// `limit` clamped to `1..=max`.
pub(crate) fn parse_limit(input: &Value, default: u64, max: u64) -> usize {
    input.optional_u64("limit", default).clamp(1, max) as usize
}

/// What is measured: an aggregation over an optional metric.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Measure {
    pub metric: Option<String>,
    pub aggregation: Aggregation,
}

impl Measure {
    /// Read `metric` and `aggregation`.
    ///
    /// Without an explicit aggregation, `default` applies; failing that, sum
    /// when a metric is given and count otherwise.
    pub fn parse(input: &Value, default: Option<Aggregation>) -> ToolResult<Self> {
        let metric = input.optional_str("metric").map(str::to_string);
        let aggregation = match input.optional_str("aggregation") {
            Some(raw) => raw.parse::<Aggregation>().map_err(|_| {
                ParameterError::invalid(
                    "aggregation",
                    raw,
                    "use sum, avg, count, count_distinct, min or max",
                )
            })?,
            None => default.unwrap_or(if metric.is_some() {
                Aggregation::Sum
            } else {
                Aggregation::Count
            }),
        };

        if aggregation.needs_metric() && metric.is_none() {
            return Err(ParameterError::missing(
                "metric",
                "this aggregation needs a numeric field such as cost or weight",
            )
            .into());
        }
        Ok(Self {
            metric,
            aggregation,
        })
    }

    /// Base query for this measure.
    pub fn query(&self, ctx: &ToolContext) -> AggregateQuery {
        AggregateQuery::new(&ctx.customer_id, self.aggregation).with_metric(self.metric.clone())
    }

    /// Whether group values can be summed into a meaningful total.
    pub fn is_additive(&self) -> bool {
        matches!(
            self.aggregation,
            Aggregation::Sum | Aggregation::Count
        )
    }

    pub fn metric_json(&self) -> Value {
        self.metric.as_deref().map_or(Value::Null, |m| json!(m))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Numeric Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        0.0
    }
}

/// `(current - previous) / previous * 100`; zero when `previous` is zero.
///
/// A negative baseline flips the sign relative to the raw delta, so callers
/// reporting a direction should read it from the delta.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

/// `up`, `down` or `flat`.
pub(crate) fn direction(change: f64) -> &'static str {
    if change > 0.0 {
        "up"
    } else if change < 0.0 {
        "down"
    } else {
        "flat"
    }
}

/// The value of an ungrouped aggregate.
pub(crate) fn scalar(rows: &[GroupRow]) -> f64 {
    rows.first().map(|row| row.value).unwrap_or(0.0)
}

pub(crate) fn range_json(range: &DateRange) -> Value {
    json!({ "start": range.start.to_string(), "end": range.end.to_string() })
}

/// One group's movement between two periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct GroupChange {
    pub group: String,
    pub current: f64,
    pub previous: f64,
    pub change: f64,
    pub percent_change: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_percent: Option<f64>,
}

/// Pair current and previous rows by group, sorted by absolute change.
///
/// With `total_change`, each group also carries its share of that change.
pub(crate) fn diff_groups(
    current: &[GroupRow],
    previous: &[GroupRow],
    total_change: Option<f64>,
) -> Vec<GroupChange> {
    let mut merged: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for row in current {
        merged.entry(row.group.as_str()).or_default().0 += row.value;
    }
    for row in previous {
        merged.entry(row.group.as_str()).or_default().1 += row.value;
    }

    let mut changes: Vec<GroupChange> = merged
        .into_iter()
        .map(|(group, (current, previous))| {
            let change = current - previous;
            GroupChange {
                group: group.to_string(),
                current: round2(current),
                previous: round2(previous),
                change: round2(change),
                percent_change: round2(percent_change(current, previous)),
                contribution_percent: total_change.map(|total| {
                    if total == 0.0 {
                        0.0
                    } else {
                        round2(change / total * 100.0)
                    }
                }),
            }
        })
        .collect();

    changes.sort_by(|a, b| {
        b.change
            .abs()
            .total_cmp(&a.change.abs())
            .then_with(|| a.group.cmp(&b.group))
    });
    changes
}

pub(crate) fn group_json(row: &GroupRow) -> Value {
    let mut value = json!({
        "group": row.group,
        "value": round2(row.value),
        "count": row.count,
    });
    if let Some(secondary) = &row.secondary {
        value["secondary_group"] = json!(secondary);
    }
    value
}

/// Merge `message` into an empty result shape.
pub fn error_result(empty: Value, message: impl Into<String>) -> Value {
    let message = Value::String(message.into());
    match empty {
        Value::Object(mut map) => {
            map.insert("error".to_string(), message);
            Value::Object(map)
        }
        _ => json!({ "error": message }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatches tool calls by name against one store.
pub struct ToolExecutor {
    handlers: HashMap<&'static str, Arc<dyn ToolHandler>>,
    store: SharedStore,
}

impl ToolExecutor {
    /// Create an executor with no tools.
    pub fn new(store: SharedStore) -> Self {
        Self {
            handlers: HashMap::new(),
            store,
        }
    }

    /// Create an executor with every built-in tool registered.
    pub fn with_default_tools(store: SharedStore) -> Self {
        let mut executor = Self::new(store);
        executor.register(ExploreField);
        executor.register(PreviewAggregation);
        executor.register(ComparePeriods);
        executor.register(DetectAnomalies);
        executor.register(AnalyzeRootCause);
        executor.register(GetTrend);
        executor.register(GetSummaryStatistics);
        executor.register(GetHierarchicalData);
        executor.register(GetDailyActivity);
        executor.register(GetGeographicData);
        executor.register(GetFlowData);
        executor.register(CompareMetrics);
        executor
    }

    /// Register a tool, replacing any tool of the same name.
    pub fn register<H: ToolHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Run one tool. Never fails; see the module docs.
    pub async fn execute(&self, name: &str, input: &Value, ctx: &ToolContext) -> Value {
        let Some(handler) = self.handlers.get(name) else {
            tracing::warn!(tool = %name, "Unknown tool requested");
            return json!({ "error": format!("Unknown tool: {}", name) });
        };

        if ctx.is_cancelled() {
            return error_result(handler.empty_result(), ToolError::Cancelled.to_string());
        }

        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(ToolError::Cancelled),
            result = handler.run(input, self.store.as_ref(), ctx) => result,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                tracing::debug!(tool = %name, elapsed_ms, store = %self.store.name(), "Tool completed");
                result
            }
            Err(e) => {
                tracing::warn!(tool = %name, elapsed_ms, error = %e, "Tool failed");
                error_result(handler.empty_result(), e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("tools", &self.names())
            .field("store", &self.store.name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn ctx() -> ToolContext {
        ToolContext::new(
            "acme",
            NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date"),
        )
    }

    pub fn row(group: &str, value: f64, count: u64) -> Value {
        json!({ "group": group, "value": value, "count": count })
    }
}

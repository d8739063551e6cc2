//! Time series, daily activity and descriptive statistics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use freightscope_store::{AnalyticsStore, Bucket, Period, ValuesQuery, normalize};
use serde::Serialize;
use serde_json::{Value, json};

use super::{
    Measure, ParamExt, ToolContext, ToolHandler, bounded_range, parse_filters, parse_period,
    percent_change, round2,
};
use crate::catalog::{GET_DAILY_ACTIVITY, GET_SUMMARY_STATISTICS, GET_TREND};
use crate::error::{ParameterError, ToolResult};

/// Trend changes within this many percent read as flat.
const FLAT_BAND_PERCENT: f64 = 5.0;

/// Longest range accepted for a daily layout.
const MAX_ACTIVITY_DAYS: i64 = 366;

/// Most edges a `buckets` list may carry.
const MAX_BUCKET_EDGES: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// get_trend
// ─────────────────────────────────────────────────────────────────────────────

/// Metric bucketed over time with an overall direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetTrend;

fn auto_interval(period: Period, today: NaiveDate) -> Bucket {
    match period.day_count(today) {
        Some(days) if days <= 31 => Bucket::Day,
        Some(days) if days <= 180 => Bucket::Week,
        _ => Bucket::Month,
    }
}

fn bucket_name(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Day => "day",
        Bucket::Week => "week",
        Bucket::Month => "month",
    }
}

#[async_trait]
impl ToolHandler for GetTrend {
    fn name(&self) -> &'static str {
        GET_TREND
    }

    fn empty_result(&self) -> Value {
        json!({ "series": [], "trend": null })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let measure = Measure::parse(input, None)?;
        let period = parse_period(input, "last90")?;
        let interval = match input.optional_str("interval") {
            Some(raw) => raw.parse::<Bucket>().map_err(|_| {
                ParameterError::invalid("interval", raw, "use day, week or month")
            })?,
            None => auto_interval(period, ctx.today),
        };

        let query = measure
            .query(ctx)
            .with_bucket(interval)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?);
        let mut rows = normalize::groups(&store.aggregate(query).await?)?;
        rows.sort_by(|a, b| a.group.cmp(&b.group));

        let series: Vec<Value> = rows
            .iter()
            .map(|r| json!({ "period": r.group, "value": round2(r.value), "count": r.count }))
            .collect();

        let trend = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => {
                let change = percent_change(last.value, first.value);
                let direction = if change.abs() <= FLAT_BAND_PERCENT {
                    "flat"
                } else {
                    super::direction(last.value - first.value)
                };
                let average = rows.iter().map(|r| r.value).sum::<f64>() / rows.len() as f64;
                let peak = rows.iter().max_by(|a, b| a.value.total_cmp(&b.value)).unwrap_or(first);
                let low = rows.iter().min_by(|a, b| a.value.total_cmp(&b.value)).unwrap_or(first);
                json!({
                    "direction": direction,
                    "percent_change": round2(change),
                    "average": round2(average),
                    "peak": { "period": peak.group, "value": round2(peak.value) },
                    "low": { "period": low.group, "value": round2(low.value) },
                })
            }
            _ => Value::Null,
        };

        Ok(json!({
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "interval": bucket_name(interval),
            "series": series,
            "trend": trend,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// get_daily_activity
// ─────────────────────────────────────────────────────────────────────────────

/// Per-day values with gaps filled, laid out by weekday and ISO week.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetDailyActivity;

#[async_trait]
impl ToolHandler for GetDailyActivity {
    fn name(&self) -> &'static str {
        GET_DAILY_ACTIVITY
    }

    fn empty_result(&self) -> Value {
        json!({ "days": [], "total": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let measure = Measure::parse(input, None)?;
        let (period, range) = bounded_range(
            input,
            "last30",
            ctx,
            "daily activity needs a bounded period such as last30",
        )?;
        if range.days() > MAX_ACTIVITY_DAYS {
            return Err(ParameterError::invalid(
                "period",
                period.label(),
                format!("daily activity covers at most {} days", MAX_ACTIVITY_DAYS),
            )
            .into());
        }

        let query = measure
            .query(ctx)
            .with_bucket(Bucket::Day)
            .with_range(Some(range))
            .with_filters(parse_filters(input)?);
        let rows = normalize::groups(&store.aggregate(query).await?)?;

        let by_day: HashMap<NaiveDate, f64> = rows
            .iter()
            .filter_map(|r| {
                let date = NaiveDate::parse_from_str(r.group.get(..10)?, "%Y-%m-%d").ok()?;
                Some((date, r.value))
            })
            .collect();

        let mut total = 0.0;
        let mut active_days = 0;
        let mut peak: Option<(NaiveDate, f64)> = None;
        let days: Vec<Value> = range
            .iter_days()
            .map(|date| {
                let value = by_day.get(&date).copied().unwrap_or(0.0);
                total += value;
                if value > 0.0 {
                    active_days += 1;
                }
                if peak.is_none_or(|(_, best)| value > best) {
                    peak = Some((date, value));
                }
                let iso = date.iso_week();
                json!({
                    "date": date.to_string(),
                    "day_of_week": date.format("%a").to_string(),
                    "week": format!("{}-W{:02}", iso.year(), iso.week()),
                    "value": round2(value),
                })
            })
            .collect();

        let peak_day = peak
            .filter(|(_, value)| *value > 0.0)
            .map(|(date, value)| json!({ "date": date.to_string(), "value": round2(value) }));

        Ok(json!({
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "days": days,
            "total": round2(total),
            "active_days": active_days,
            "peak_day": peak_day,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// get_summary_statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Descriptive statistics of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub p90: f64,
}

/// Summarize `values`; `None` when empty.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    let mean = sum / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(Summary {
        count: sorted.len(),
        sum,
        mean,
        median: percentile(&sorted, 0.5),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        std_dev: variance.sqrt(),
        p90: percentile(&sorted, 0.9),
    })
}

/// Linear-interpolated percentile of a sorted, non-empty slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// One band of a distribution. Bands are half-open, `[lower, upper)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub band: String,
    pub count: usize,
    pub percent: f64,
}

/// Ascending lower edges from the `buckets` parameter, if given.
fn parse_bucket_edges(input: &Value) -> Result<Option<Vec<f64>>, ParameterError> {
    let Some(raw) = input.get("buckets").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let invalid = |message: &str| ParameterError::invalid("buckets", raw.to_string(), message);

    let edges = raw
        .as_array()
        .ok_or_else(|| invalid("expected an array of numbers such as [0, 2, 4, 6]"))?
        .iter()
        .map(|edge| edge.as_f64().filter(|e| e.is_finite()))
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| invalid("every edge must be a number"))?;

    if edges.is_empty() || edges.len() > MAX_BUCKET_EDGES {
        return Err(invalid("between 1 and 20 edges are allowed"));
    }
    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(invalid("edges must be strictly ascending"));
    }
    Ok(Some(edges))
}

fn edge_text(edge: f64) -> String {
    if edge.fract() == 0.0 {
        format!("{}", edge as i64)
    } else {
        format!("{}", edge)
    }
}

/// `0-1` style labels for whole-number edges, `0-2.5` otherwise.
fn band_label(lower: f64, upper: Option<f64>) -> String {
    match upper {
        None => format!("{}+", edge_text(lower)),
        Some(upper) if lower.fract() == 0.0 && upper.fract() == 0.0 => {
            if upper - lower == 1.0 {
                edge_text(lower)
            } else {
                format!("{}-{}", edge_text(lower), edge_text(upper - 1.0))
            }
        }
        Some(upper) => format!("{}-{}", edge_text(lower), edge_text(upper)),
    }
}

/// Count `values` into bands starting at each edge. The last band is open
/// ended; values below the first edge get a leading `<edge` band only when
/// there are any.
pub fn distribute(values: &[f64], edges: &[f64]) -> Vec<Band> {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let mut counts = vec![0usize; edges.len()];
    let mut below = 0usize;
    for value in &values {
        match edges.iter().rposition(|edge| value >= edge) {
            Some(index) => counts[index] += 1,
            None => below += 1,
        }
    }

    let share = |count: usize| {
        if values.is_empty() {
            0.0
        } else {
            round2(count as f64 / values.len() as f64 * 100.0)
        }
    };

    let mut bands = Vec::with_capacity(edges.len() + 1);
    if below > 0 {
        bands.push(Band {
            band: format!("<{}", edge_text(edges[0])),
            count: below,
            percent: share(below),
        });
    }
    for (index, count) in counts.into_iter().enumerate() {
        bands.push(Band {
            band: band_label(edges[index], edges.get(index + 1).copied()),
            count,
            percent: share(count),
        });
    }
    bands
}

/// Count, sum, mean, median, spread and p90 of a numeric field.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSummaryStatistics;

#[async_trait]
impl ToolHandler for GetSummaryStatistics {
    fn name(&self) -> &'static str {
        GET_SUMMARY_STATISTICS
    }

    fn empty_result(&self) -> Value {
        json!({ "count": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let metric = input.required_str("metric", "a numeric field such as cost or weight")?;
        let period = parse_period(input, "last30")?;
        let edges = parse_bucket_edges(input)?;
        let query = ValuesQuery::new(&ctx.customer_id, metric)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?);

        let values = normalize::values(&store.fetch_values(query).await?)?;
        let Some(summary) = summarize(&values) else {
            return Ok(json!({ "metric": metric, "period": period.label(), "count": 0 }));
        };

        let mut result = json!({
            "metric": metric,
            "period": period.label(),
            "count": summary.count,
            "sum": round2(summary.sum),
            "mean": round2(summary.mean),
            "median": round2(summary.median),
            "min": round2(summary.min),
            "max": round2(summary.max),
            "std_dev": round2(summary.std_dev),
            "p90": round2(summary.p90),
        });
        if let Some(edges) = edges {
            result["distribution"] = json!(distribute(&values, &edges));
        }
        Ok(result)
    }
}

//! Grouped aggregation, period comparison and multi-metric comparison.

use std::collections::HashMap;

use async_trait::async_trait;
use freightscope_store::{AggregateQuery, Aggregation, AnalyticsStore, GroupRow, normalize};
use futures::future::{try_join, try_join_all};
use serde_json::{Map, Value, json};

use super::{
    Measure, ParamExt, ToolContext, ToolHandler, comparison_ranges, diff_groups, direction,
    group_json, parse_filters, parse_limit, parse_period, percent_change, range_json, round2,
    scalar,
};
use crate::catalog::{COMPARE_METRICS, COMPARE_PERIODS, PREVIEW_AGGREGATION};
use crate::error::{ParameterError, ToolResult};

// ─────────────────────────────────────────────────────────────────────────────
// preview_aggregation
// ─────────────────────────────────────────────────────────────────────────────

/// Group-and-aggregate over one or two dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewAggregation;

#[async_trait]
impl ToolHandler for PreviewAggregation {
    fn name(&self) -> &'static str {
        PREVIEW_AGGREGATION
    }

    fn empty_result(&self) -> Value {
        json!({ "groups": [], "total": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let measure = Measure::parse(input, None)?;
        let group_by = input.optional_str("group_by");
        let secondary = input.optional_str("secondary_group_by");
        if let Some(secondary) = secondary
            && group_by.is_none()
        {
            return Err(ParameterError::invalid(
                "secondary_group_by",
                secondary,
                "requires group_by to be set as well",
            )
            .into());
        }
        let period = parse_period(input, "last30")?;

        let mut query = measure
            .query(ctx)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?)
            .with_limit(parse_limit(input, 20, 100))
            .with_secondary_group_by(secondary);
        if let Some(group_by) = group_by {
            query = query.with_group_by(group_by);
        }

        let rows = normalize::groups(&store.aggregate(query).await?)?;
        let record_count: u64 = rows.iter().map(|r| r.count).sum();
        let total = measure
            .is_additive()
            .then(|| round2(rows.iter().map(|r| r.value).sum()));

        Ok(json!({
            "group_by": group_by,
            "secondary_group_by": secondary,
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "groups": rows.iter().map(group_json).collect::<Vec<_>>(),
            "total": total,
            "record_count": record_count,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// compare_periods
// ─────────────────────────────────────────────────────────────────────────────

/// A metric in one period against a comparison period.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparePeriods;

#[async_trait]
impl ToolHandler for ComparePeriods {
    fn name(&self) -> &'static str {
        COMPARE_PERIODS
    }

    fn empty_result(&self) -> Value {
        json!({
            "current_value": 0,
            "previous_value": 0,
            "change": 0,
            "percent_change": 0,
            "direction": "flat"
        })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let measure = Measure::parse(input, None)?;
        let (period, current, previous) = comparison_ranges(input, ctx)?;
        let filters = parse_filters(input)?;
        let group_by = input.optional_str("group_by");

        let totals = |range| {
            measure
                .query(ctx)
                .with_range(Some(range))
                .with_filters(filters.clone())
        };
        let (now, before) = try_join(
            store.aggregate(totals(current)),
            store.aggregate(totals(previous)),
        )
        .await?;
        let current_value = scalar(&normalize::groups(&now)?);
        let previous_value = scalar(&normalize::groups(&before)?);
        let change = current_value - previous_value;

        let mut result = json!({
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "current_period": range_json(&current),
            "previous_period": range_json(&previous),
            "current_value": round2(current_value),
            "previous_value": round2(previous_value),
            "change": round2(change),
            "percent_change": round2(percent_change(current_value, previous_value)),
            "direction": direction(change),
        });

        if let Some(group_by) = group_by {
            let grouped = |range| totals(range).with_group_by(group_by);
            let (now, before) = try_join(
                store.aggregate(grouped(current)),
                store.aggregate(grouped(previous)),
            )
            .await?;
            let mut changes = diff_groups(
                &normalize::groups(&now)?,
                &normalize::groups(&before)?,
                None,
            );
            changes.truncate(parse_limit(input, 10, 50));
            result["group_by"] = json!(group_by);
            result["groups"] = serde_json::to_value(changes).unwrap_or_default();
        }

        Ok(result)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// compare_metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Several metrics side by side across the top groups of one field.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareMetrics;

const MIN_METRICS: usize = 2;
const MAX_METRICS: usize = 6;

#[async_trait]
impl ToolHandler for CompareMetrics {
    fn name(&self) -> &'static str {
        COMPARE_METRICS
    }

    fn empty_result(&self) -> Value {
        json!({ "groups": [], "metrics": [] })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let metrics = input.optional_str_list("metrics").ok_or_else(|| {
            ParameterError::missing("metrics", "a list of 2 to 6 numeric fields")
        })?;
        if !(MIN_METRICS..=MAX_METRICS).contains(&metrics.len()) {
            return Err(ParameterError::invalid(
                "metrics",
                metrics.join(","),
                format!("expected {} to {} distinct metrics", MIN_METRICS, MAX_METRICS),
            )
            .into());
        }
        let group_by = input.required_str("group_by", "the field whose groups are compared")?;
        let aggregation = match input.optional_str("aggregation") {
            None => Aggregation::Avg,
            Some(raw) => match raw.parse::<Aggregation>() {
                Ok(Aggregation::Count) | Err(_) => {
                    return Err(ParameterError::invalid(
                        "aggregation",
                        raw,
                        "use avg, sum, min, max or count_distinct",
                    )
                    .into());
                }
                Ok(aggregation) => aggregation,
            },
        };
        let period = parse_period(input, "last30")?;
        let filters = parse_filters(input)?;
        let limit = parse_limit(input, 5, 10);

        let queries = metrics.iter().map(|metric| {
            AggregateQuery::new(&ctx.customer_id, aggregation)
                .with_metric(Some(metric.as_str()))
                .with_group_by(group_by)
                .with_range(period.resolve(ctx.today))
                .with_filters(filters.clone())
        });
        let envelopes = try_join_all(queries.map(|q| store.aggregate(q))).await?;
        let per_metric: Vec<Vec<GroupRow>> = envelopes
            .iter()
            .map(normalize::groups)
            .collect::<Result<_, _>>()?;

        let groups = top_groups(&per_metric[0], limit);
        let lookup: Vec<HashMap<&str, f64>> = per_metric
            .iter()
            .map(|rows| rows.iter().map(|r| (r.group.as_str(), r.value)).collect())
            .collect();
        let max_per_metric: Vec<f64> = lookup
            .iter()
            .map(|values| {
                groups
                    .iter()
                    .filter_map(|g| values.get(g.as_str()))
                    .fold(0.0_f64, |acc, v| acc.max(v.abs()))
            })
            .collect();

        let rows: Vec<Value> = groups
            .iter()
            .map(|group| {
                let mut values = Map::new();
                let mut normalized = Map::new();
                for (i, metric) in metrics.iter().enumerate() {
                    let value = lookup[i].get(group.as_str()).copied().unwrap_or(0.0);
                    let scaled = if max_per_metric[i] > 0.0 {
                        value / max_per_metric[i] * 100.0
                    } else {
                        0.0
                    };
                    values.insert(metric.clone(), json!(round2(value)));
                    normalized.insert(metric.clone(), json!(round2(scaled)));
                }
                json!({ "group": group, "values": values, "normalized": normalized })
            })
            .collect();

        Ok(json!({
            "group_by": group_by,
            "aggregation": aggregation.as_str(),
            "period": period.label(),
            "metrics": metrics,
            "groups": rows,
        }))
    }
}

/// Group names ordered by value, largest first.
fn top_groups(rows: &[GroupRow], limit: usize) -> Vec<String> {
    let mut sorted: Vec<&GroupRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.group.cmp(&b.group)));
    sorted
        .into_iter()
        .take(limit)
        .map(|r| r.group.clone())
        .collect()
}

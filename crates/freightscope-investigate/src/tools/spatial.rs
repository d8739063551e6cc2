//! Hierarchical, geographic and origin-destination breakdowns.

use std::collections::BTreeMap;

use async_trait::async_trait;
use freightscope_store::{Aggregation, AnalyticsStore, GroupRow, normalize};
use futures::future::OptionFuture;
use serde_json::{Value, json};

use super::{
    Measure, ParamExt, ToolContext, ToolHandler, parse_filters, parse_limit, parse_period, round2,
};
use crate::catalog::{GET_FLOW_DATA, GET_GEOGRAPHIC_DATA, GET_HIERARCHICAL_DATA};
use crate::error::ToolResult;

const DEFAULT_REGION_FIELD: &str = "destination_state";
const DEFAULT_ORIGIN_FIELD: &str = "origin_state";
const DEFAULT_DESTINATION_FIELD: &str = "destination_state";

/// Placeholder the stores use for records missing the grouped field.
const MISSING_GROUP: &str = "(none)";

fn sort_desc(rows: &mut [GroupRow]) {
    rows.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.group.cmp(&b.group)));
}

// ─────────────────────────────────────────────────────────────────────────────
// get_hierarchical_data
// ─────────────────────────────────────────────────────────────────────────────

/// One- or two-level proportional breakdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetHierarchicalData;

#[async_trait]
impl ToolHandler for GetHierarchicalData {
    fn name(&self) -> &'static str {
        GET_HIERARCHICAL_DATA
    }

    fn empty_result(&self) -> Value {
        json!({ "items": [], "total": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let group_by = input.required_str("group_by", "the top-level field, e.g. carrier")?;
        let secondary = input.optional_str("secondary_group_by");
        let measure = Measure::parse(input, None)?;
        let period = parse_period(input, "last30")?;
        let limit = parse_limit(input, 10, 50);

        let base = measure
            .query(ctx)
            .with_group_by(group_by)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?);

        let nested: OptionFuture<_> = secondary
            .map(|field| store.aggregate(base.clone().with_secondary_group_by(Some(field))))
            .into();
        let (primary, nested) =
            futures::join!(store.aggregate(base.clone().with_limit(limit)), nested);

        let mut parents = normalize::groups(&primary?)?;
        sort_desc(&mut parents);
        parents.truncate(limit);

        let mut children: BTreeMap<String, Vec<GroupRow>> = BTreeMap::new();
        if let Some(nested) = nested {
            for row in normalize::groups(&nested?)? {
                if let Some(name) = row.secondary.clone() {
                    children
                        .entry(row.group.clone())
                        .or_default()
                        .push(GroupRow { group: name, ..row });
                }
            }
        }

        let items: Vec<Value> = parents
            .iter()
            .map(|parent| {
                let mut kids = children.remove(&parent.group).unwrap_or_default();
                sort_desc(&mut kids);
                kids.truncate(limit);
                json!({
                    "name": parent.group,
                    "value": round2(parent.value),
                    "count": parent.count,
                    "children": kids
                        .iter()
                        .map(|k| json!({ "name": k.group, "value": round2(k.value), "count": k.count }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        let total: f64 = parents.iter().map(|p| p.value).sum();

        Ok(json!({
            "group_by": group_by,
            "secondary_group_by": secondary,
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "items": items,
            "total": round2(total),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// get_geographic_data
// ─────────────────────────────────────────────────────────────────────────────

/// Metric by region code.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetGeographicData;

/// Fold two values for the same region under `aggregation`.
fn combine(aggregation: Aggregation, (a, a_count): (f64, u64), (b, b_count): (f64, u64)) -> f64 {
    match aggregation {
        Aggregation::Sum | Aggregation::Count | Aggregation::CountDistinct => a + b,
        Aggregation::Min => a.min(b),
        Aggregation::Max => a.max(b),
        Aggregation::Avg => {
            let total = a_count + b_count;
            if total == 0 {
                (a + b) / 2.0
            } else {
                (a * a_count as f64 + b * b_count as f64) / total as f64
            }
        }
    }
}

#[async_trait]
impl ToolHandler for GetGeographicData {
    fn name(&self) -> &'static str {
        GET_GEOGRAPHIC_DATA
    }

    fn empty_result(&self) -> Value {
        json!({ "regions": [], "total": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let region_field = input
            .optional_str("region_field")
            .unwrap_or(DEFAULT_REGION_FIELD);
        let measure = Measure::parse(input, None)?;
        let period = parse_period(input, "last30")?;

        let query = measure
            .query(ctx)
            .with_group_by(region_field)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?);
        let rows = normalize::groups(&store.aggregate(query).await?)?;

        // Codes arrive in mixed case ("tx", "TX ") and must merge.
        let mut regions: BTreeMap<String, (f64, u64)> = BTreeMap::new();
        for row in rows {
            let code = row.group.trim().to_ascii_uppercase();
            if code.is_empty() || row.group == MISSING_GROUP {
                continue;
            }
            let incoming = (row.value, row.count);
            regions
                .entry(code)
                .and_modify(|existing| {
                    *existing = (
                        combine(measure.aggregation, *existing, incoming),
                        existing.1 + incoming.1,
                    );
                })
                .or_insert(incoming);
        }

        let mut merged: Vec<(String, f64, u64)> = regions
            .into_iter()
            .map(|(code, (value, count))| (code, value, count))
            .collect();
        merged.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        merged.truncate(parse_limit(input, 60, 250));

        let total: f64 = merged.iter().map(|r| r.1).sum();
        Ok(json!({
            "region_field": region_field,
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "regions": merged
                .iter()
                .map(|(region, value, count)| json!({ "region": region, "value": round2(*value), "count": count }))
                .collect::<Vec<_>>(),
            "total": round2(total),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// get_flow_data
// ─────────────────────────────────────────────────────────────────────────────

/// Origin to destination aggregates.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetFlowData;

#[async_trait]
impl ToolHandler for GetFlowData {
    fn name(&self) -> &'static str {
        GET_FLOW_DATA
    }

    fn empty_result(&self) -> Value {
        json!({ "flows": [], "total": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let origin_field = input
            .optional_str("origin_field")
            .unwrap_or(DEFAULT_ORIGIN_FIELD);
        let destination_field = input
            .optional_str("destination_field")
            .unwrap_or(DEFAULT_DESTINATION_FIELD);
        let measure = Measure::parse(input, None)?;
        let period = parse_period(input, "last30")?;
        let limit = parse_limit(input, 25, 100);

        let query = measure
            .query(ctx)
            .with_group_by(origin_field)
            .with_secondary_group_by(Some(destination_field))
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?)
            .with_limit(limit);
        let mut rows = normalize::groups(&store.aggregate(query).await?)?;
        rows.retain(|r| r.group != MISSING_GROUP && r.secondary.as_deref() != Some(MISSING_GROUP));
        sort_desc(&mut rows);
        rows.truncate(limit);

        let total: f64 = rows.iter().map(|r| r.value).sum();
        let flows: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "origin": r.group,
                    "destination": r.secondary.as_deref().unwrap_or(MISSING_GROUP),
                    "value": round2(r.value),
                    "count": r.count,
                })
            })
            .collect();

        Ok(json!({
            "origin_field": origin_field,
            "destination_field": destination_field,
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "flows": flows,
            "total": round2(total),
        }))
    }
}

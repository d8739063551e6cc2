//! Outlier detection and change attribution.

use std::str::FromStr;

use async_trait::async_trait;
use freightscope_store::{AnalyticsStore, normalize};
use futures::future::{try_join, try_join_all};
use serde_json::{Value, json};

use super::{
    Measure, ParamExt, ToolContext, ToolHandler, comparison_ranges, diff_groups, parse_filters,
    parse_limit, parse_period, percent_change, range_json, round2, scalar,
};
use crate::catalog::{ANALYZE_ROOT_CAUSE, DETECT_ANOMALIES};
use crate::error::{ParameterError, ToolResult};

// ─────────────────────────────────────────────────────────────────────────────
// Outlier statistics
// ─────────────────────────────────────────────────────────────────────────────

/// How far from the mean a value must be to count as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Z-score threshold.
    pub fn threshold(&self) -> f64 {
        match self {
            Sensitivity::Low => 3.0,
            Sensitivity::Medium => 2.0,
            Sensitivity::High => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        }
    }
}

impl FromStr for Sensitivity {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Sensitivity::Low),
            "medium" | "normal" => Ok(Sensitivity::Medium),
            "high" => Ok(Sensitivity::High),
            _ => Err(ParameterError::invalid(
                "sensitivity",
                s,
                "use low, medium or high",
            )),
        }
    }
}

/// Score of one value against the population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScore {
    pub z: f64,
    pub is_outlier: bool,
}

/// Population statistics plus a score for each input value, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierScan {
    pub mean: f64,
    pub std_dev: f64,
    pub scores: Vec<ZScore>,
}

impl OutlierScan {
    pub fn outlier_count(&self) -> usize {
        self.scores.iter().filter(|s| s.is_outlier).count()
    }
}

/// Score `values` with population standard deviation.
///
/// A value is an outlier when `|z| > threshold`. With zero spread nothing is.
pub fn find_outliers(values: &[f64], threshold: f64) -> OutlierScan {
    if values.is_empty() {
        return OutlierScan {
            mean: 0.0,
            std_dev: 0.0,
            scores: Vec::new(),
        };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let scores = values
        .iter()
        .map(|v| {
            if std_dev == 0.0 {
                ZScore {
                    z: 0.0,
                    is_outlier: false,
                }
            } else {
                let z = (v - mean) / std_dev;
                ZScore {
                    z,
                    is_outlier: z.abs() > threshold,
                }
            }
        })
        .collect();

    OutlierScan {
        mean,
        std_dev,
        scores,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// detect_anomalies
// ─────────────────────────────────────────────────────────────────────────────

/// Groups whose aggregated value is a statistical outlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectAnomalies;

#[async_trait]
impl ToolHandler for DetectAnomalies {
    fn name(&self) -> &'static str {
        DETECT_ANOMALIES
    }

    fn empty_result(&self) -> Value {
        json!({ "groups": [], "anomalies": [], "anomaly_count": 0 })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let group_by = input.required_str("group_by", "the field whose groups are compared, e.g. carrier")?;
        let measure = Measure::parse(input, None)?;
        let sensitivity = match input.optional_str("sensitivity") {
            Some(raw) => raw.parse::<Sensitivity>()?,
            None => Sensitivity::default(),
        };
        let period = parse_period(input, "last30")?;

        let query = measure
            .query(ctx)
            .with_group_by(group_by)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?)
            .with_limit(parse_limit(input, 50, 200));
        let rows = normalize::groups(&store.aggregate(query).await?)?;

        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        let threshold = sensitivity.threshold();
        let scan = find_outliers(&values, threshold);

        let groups: Vec<Value> = rows
            .iter()
            .zip(&scan.scores)
            .map(|(row, score)| {
                json!({
                    "group": row.group,
                    "value": round2(row.value),
                    "count": row.count,
                    "z_score": round2(score.z),
                    "is_outlier": score.is_outlier,
                })
            })
            .collect();

        let mut outliers: Vec<(usize, f64)> = scan
            .scores
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_outlier)
            .map(|(i, s)| (i, s.z))
            .collect();
        outliers.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        let anomalies: Vec<Value> = outliers
            .iter()
            .map(|&(i, z)| {
                json!({
                    "group": rows[i].group,
                    "value": round2(rows[i].value),
                    "z_score": round2(z),
                    "direction": if z > 0.0 { "above" } else { "below" },
                })
            })
            .collect();

        Ok(json!({
            "group_by": group_by,
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "period": period.label(),
            "sensitivity": sensitivity.as_str(),
            "threshold": threshold,
            "mean": round2(scan.mean),
            "std_dev": round2(scan.std_dev),
            "groups": groups,
            "anomaly_count": anomalies.len(),
            "anomalies": anomalies,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// analyze_root_cause
// ─────────────────────────────────────────────────────────────────────────────

/// Attribute a change between two periods to groups along several dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeRootCause;

const MAX_DIMENSIONS: usize = 5;

#[async_trait]
impl ToolHandler for AnalyzeRootCause {
    fn name(&self) -> &'static str {
        ANALYZE_ROOT_CAUSE
    }

    fn empty_result(&self) -> Value {
        json!({ "dimensions": [], "top_driver": null })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let dimensions = input.optional_str_list("dimensions").ok_or_else(|| {
            ParameterError::missing("dimensions", "one to five fields, e.g. [\"carrier\"]")
        })?;
        if dimensions.len() > MAX_DIMENSIONS {
            return Err(ParameterError::invalid(
                "dimensions",
                dimensions.join(","),
                format!("at most {} dimensions", MAX_DIMENSIONS),
            )
            .into());
        }
        let measure = Measure::parse(input, None)?;
        let (_, current, previous) = comparison_ranges(input, ctx)?;
        let filters = parse_filters(input)?;
        let top_n = input.optional_u64("top_n", 5).clamp(1, 20) as usize;

        let base = |range| {
            measure
                .query(ctx)
                .with_range(Some(range))
                .with_filters(filters.clone())
        };
        let (now, before) =
            try_join(store.aggregate(base(current)), store.aggregate(base(previous))).await?;
        let current_value = scalar(&normalize::groups(&now)?);
        let previous_value = scalar(&normalize::groups(&before)?);
        let total_change = current_value - previous_value;

        let breakdowns = try_join_all(dimensions.iter().map(|dimension| {
            try_join(
                store.aggregate(base(current).with_group_by(dimension)),
                store.aggregate(base(previous).with_group_by(dimension)),
            )
        }))
        .await?;

        let mut top_driver: Option<Value> = None;
        let mut top_change = f64::NEG_INFINITY;
        let mut breakdown_json = Vec::with_capacity(dimensions.len());

        for (dimension, (now, before)) in dimensions.iter().zip(&breakdowns) {
            let mut contributors = diff_groups(
                &normalize::groups(now)?,
                &normalize::groups(before)?,
                Some(total_change),
            );
            contributors.truncate(top_n);

            if let Some(first) = contributors.first()
                && first.change.abs() > top_change
            {
                top_change = first.change.abs();
                top_driver = Some(json!({
                    "dimension": dimension,
                    "group": first.group,
                    "change": first.change,
                    "contribution_percent": first.contribution_percent,
                }));
            }

            breakdown_json.push(json!({
                "dimension": dimension,
                "contributors": serde_json::to_value(&contributors).unwrap_or_default(),
            }));
        }

        Ok(json!({
            "metric": measure.metric_json(),
            "aggregation": measure.aggregation.as_str(),
            "current_period": range_json(&current),
            "previous_period": range_json(&previous),
            "current_value": round2(current_value),
            "previous_value": round2(previous_value),
            "total_change": round2(total_change),
            "percent_change": round2(percent_change(current_value, previous_value)),
            "dimensions": breakdown_json,
            "top_driver": top_driver,
        }))
    }
}

//! Tool result to visualization mapping.
//!
//! [`VisualizationMapper::map`] is pure: identical inputs give descriptors
//! equal in everything but their id. Results carrying an `error` key, empty
//! results and shapes a chart cannot show well map to `None`.

use std::collections::HashMap;

use freightscope_store::Aggregation;
use serde_json::{Value, json};

use crate::catalog::{
    ANALYZE_ROOT_CAUSE, COMPARE_METRICS, COMPARE_PERIODS, DETECT_ANOMALIES, EXPLORE_FIELD,
    GET_DAILY_ACTIVITY, GET_FLOW_DATA, GET_GEOGRAPHIC_DATA, GET_HIERARCHICAL_DATA,
    GET_SUMMARY_STATISTICS, GET_TREND, PREVIEW_AGGREGATION,
};
use crate::visualization::{
    Chart, DataPoint, Flow, HeatmapCell, RadarAxis, RadarSeries, RegionValue, StatComparison,
    StatData, TreemapNode, ValueFormat, Visualization,
};

/// A pie chart with more slices than this is unreadable.
const MAX_PIE_SLICES: u64 = 10;

type Rule = fn(&Value, &Value) -> Option<Visualization>;

/// Maps tool results to visualization descriptors, one rule per tool.
#[derive(Debug, Clone)]
pub struct VisualizationMapper {
    rules: HashMap<&'static str, Rule>,
}

impl Default for VisualizationMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualizationMapper {
    pub fn new() -> Self {
        let rules: [(&'static str, Rule); 12] = [
            (EXPLORE_FIELD, map_explore_field),
            (PREVIEW_AGGREGATION, map_preview_aggregation),
            (COMPARE_PERIODS, map_compare_periods),
            (DETECT_ANOMALIES, map_detect_anomalies),
            (ANALYZE_ROOT_CAUSE, map_root_cause),
            (GET_TREND, map_trend),
            (GET_SUMMARY_STATISTICS, map_summary_statistics),
            (GET_HIERARCHICAL_DATA, map_hierarchy),
            (GET_DAILY_ACTIVITY, map_daily_activity),
            (GET_GEOGRAPHIC_DATA, map_geographic),
            (GET_FLOW_DATA, map_flows),
            (COMPARE_METRICS, map_compare_metrics),
        ];
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn has_rule(&self, tool: &str) -> bool {
        self.rules.contains_key(tool)
    }

    /// Tools with a rule, sorted.
    pub fn tools(&self) -> Vec<&'static str> {
        let mut tools: Vec<&'static str> = self.rules.keys().copied().collect();
        tools.sort_unstable();
        tools
    }

    /// Map one tool result. Unknown tools and error results give `None`.
    pub fn map(&self, tool: &str, input: &Value, result: &Value) -> Option<Visualization> {
        if !result.is_object() || result.get("error").is_some() {
            return None;
        }
        let rule = self.rules.get(tool)?;
        rule(input, result)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Labels and formats
// ─────────────────────────────────────────────────────────────────────────────

/// `transit_days` → `Transit Days`.
pub fn humanize(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

const CURRENCY_KEYWORDS: [&str; 6] = ["cost", "retail", "spend", "revenue", "price", "charge"];
const PERCENT_KEYWORDS: [&str; 4] = ["percent", "rate", "ratio", "pct"];

/// Display format for a metric, by keyword. Counts are always plain numbers.
pub fn infer_format(metric: Option<&str>, aggregation: Option<&str>) -> ValueFormat {
    if matches!(
        parse_aggregation(aggregation),
        Some(Aggregation::Count | Aggregation::CountDistinct)
    ) {
        return ValueFormat::Number;
    }
    let Some(metric) = metric.map(str::to_ascii_lowercase) else {
        return ValueFormat::Number;
    };
    if CURRENCY_KEYWORDS.iter().any(|k| metric.contains(k)) {
        ValueFormat::Currency
    } else if PERCENT_KEYWORDS.iter().any(|k| metric.contains(k)) {
        ValueFormat::Percent
    } else {
        ValueFormat::Number
    }
}

fn parse_aggregation(aggregation: Option<&str>) -> Option<Aggregation> {
    aggregation.and_then(|a| a.parse().ok())
}

/// "Total Cost", "Average Transit Days", "Shipment Count".
fn measure_title(metric: Option<&str>, aggregation: Option<&str>) -> String {
    let aggregation = parse_aggregation(aggregation);
    match (metric, aggregation) {
        (None, _) | (_, Some(Aggregation::Count)) => "Shipment Count".to_string(),
        (Some(metric), aggregation) => {
            let name = humanize(metric);
            let label = aggregation.unwrap_or_default().label();
            if name.to_lowercase().starts_with(&label.to_lowercase()) {
                name
            } else {
                format!("{} {}", label, name)
            }
        }
    }
}

/// Metric and aggregation as reported by the result, falling back to the input.
struct Measure<'a> {
    metric: Option<&'a str>,
    aggregation: Option<&'a str>,
}

impl<'a> Measure<'a> {
    fn of(input: &'a Value, result: &'a Value) -> Self {
        Self {
            metric: str_field(result, "metric").or_else(|| str_field(input, "metric")),
            aggregation: str_field(result, "aggregation")
                .or_else(|| str_field(input, "aggregation")),
        }
    }

    fn title(&self) -> String {
        measure_title(self.metric, self.aggregation)
    }

    fn format(&self) -> ValueFormat {
        infer_format(self.metric, self.aggregation)
    }

    fn value_label(&self) -> String {
        match self.metric {
            Some(metric) if parse_aggregation(self.aggregation) != Some(Aggregation::Count) => {
                humanize(metric)
            }
            _ => "Shipments".to_string(),
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn num(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn label(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "(none)".to_string(),
        Some(other) => other.to_string(),
    }
}

fn rows<'a>(result: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    result.get(key).and_then(Value::as_array).filter(|rows| !rows.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules
// ─────────────────────────────────────────────────────────────────────────────

fn map_explore_field(input: &Value, result: &Value) -> Option<Visualization> {
    let distinct = result.get("distinct_count").and_then(Value::as_u64).unwrap_or(0);
    if distinct > MAX_PIE_SLICES {
        return None;
    }
    let top = rows(result, "top_values")?;
    let field = str_field(result, "field").or_else(|| str_field(input, "field"))?;

    let data = top
        .iter()
        .map(|v| DataPoint::new(label(v, "value"), num(v, "count")))
        .collect();
    Some(
        Visualization::new(
            format!("{} Distribution", humanize(field)),
            Chart::Pie(data),
            ValueFormat::Number,
        )
        .with_value_label("Shipments")
        .with_subtitle(format!(
            "{} distinct values, {:.1}% coverage",
            distinct,
            num(result, "coverage")
        )),
    )
}

fn map_preview_aggregation(input: &Value, result: &Value) -> Option<Visualization> {
    let group_by = str_field(result, "group_by")?;
    let groups = rows(result, "groups")?;
    let measure = Measure::of(input, result);
    let secondary = str_field(result, "secondary_group_by");

    let data = groups
        .iter()
        .map(|g| {
            let name = match g.get("secondary_group").and_then(Value::as_str) {
                Some(sub) => format!("{} / {}", label(g, "group"), sub),
                None => label(g, "group"),
            };
            DataPoint::new(name, num(g, "value"))
        })
        .collect();

    let mut title = format!("{} by {}", measure.title(), humanize(group_by));
    if let Some(secondary) = secondary {
        title.push_str(&format!(" and {}", humanize(secondary)));
    }
    Some(
        Visualization::new(title, Chart::Bar(data), measure.format())
            .with_value_label(measure.value_label())
            .with_config("group_by", json!(group_by)),
    )
}

fn map_compare_periods(input: &Value, result: &Value) -> Option<Visualization> {
    let measure = Measure::of(input, result);
    let format = measure.format();
    let change = num(result, "percent_change");
    let direction = str_field(result, "direction").unwrap_or("flat");

    let stat = StatData {
        value: num(result, "current_value"),
        comparison: Some(StatComparison {
            value: num(result, "previous_value"),
            label: "previous period".to_string(),
            direction: direction.to_string(),
        }),
    };
    Some(
        Visualization::new(
            format!("{} vs Previous Period", measure.title()),
            Chart::Stat(stat),
            format,
        )
        .with_value_label(measure.value_label())
        .with_subtitle(format!(
            "{}{} vs previous period ({})",
            if change > 0.0 { "+" } else { "" },
            ValueFormat::Percent.format_value(change),
            format.format_value(num(result, "previous_value"))
        )),
    )
}

fn map_detect_anomalies(input: &Value, result: &Value) -> Option<Visualization> {
    let groups = rows(result, "groups")?;
    let group_by = str_field(result, "group_by").or_else(|| str_field(input, "group_by"))?;
    let measure = Measure::of(input, result);

    let data = groups
        .iter()
        .map(|g| DataPoint::new(label(g, "group"), num(g, "value")))
        .collect();
    let highlight: Vec<String> = groups
        .iter()
        .filter(|g| g.get("is_outlier").and_then(Value::as_bool).unwrap_or(false))
        .map(|g| label(g, "group"))
        .collect();

    Some(
        Visualization::new(
            format!("{} by {}: Anomalies", measure.title(), humanize(group_by)),
            Chart::Bar(data),
            measure.format(),
        )
        .with_subtitle(format!("{} anomalies detected", highlight.len()))
        .with_value_label(measure.value_label())
        .with_config("highlight", json!(highlight))
        .with_config("mean", json!(num(result, "mean"))),
    )
}

fn map_root_cause(input: &Value, result: &Value) -> Option<Visualization> {
    let dimensions = rows(result, "dimensions")?;
    let driver_dimension = result
        .get("top_driver")
        .and_then(|d| d.get("dimension"))
        .and_then(Value::as_str);
    let breakdown = dimensions
        .iter()
        .find(|d| driver_dimension.is_some_and(|name| str_field(d, "dimension") == Some(name)))
        .or_else(|| dimensions.iter().find(|d| rows(d, "contributors").is_some()))?;
    let contributors = rows(breakdown, "contributors")?;
    let dimension = str_field(breakdown, "dimension")?;
    let measure = Measure::of(input, result);

    let data = contributors
        .iter()
        .map(|c| DataPoint::new(label(c, "group"), num(c, "change")))
        .collect();
    Some(
        Visualization::new(
            format!("Change in {} by {}", measure.title(), humanize(dimension)),
            Chart::Bar(data),
            measure.format(),
        )
        .with_subtitle(format!(
            "Total change {}",
            measure.format().format_value(num(result, "total_change"))
        ))
        .with_value_label("Change"),
    )
}

fn map_trend(input: &Value, result: &Value) -> Option<Visualization> {
    let series = rows(result, "series")?;
    let measure = Measure::of(input, result);

    let data = series
        .iter()
        .map(|p| DataPoint::new(label(p, "period"), num(p, "value")))
        .collect();
    let mut viz = Visualization::new(
        format!("{} Trend", measure.title()),
        Chart::Line(data),
        measure.format(),
    )
    .with_value_label(measure.value_label());

    if let Some(interval) = str_field(result, "interval") {
        viz = viz.with_config("interval", json!(interval));
    }
    if let Some(trend) = result.get("trend").filter(|t| t.is_object()) {
        let direction = str_field(trend, "direction").unwrap_or("flat");
        viz = viz.with_subtitle(format!(
            "{} {} over the period",
            humanize(direction),
            ValueFormat::Percent.format_value(num(trend, "percent_change").abs())
        ));
    }
    Some(viz)
}

fn map_summary_statistics(input: &Value, result: &Value) -> Option<Visualization> {
    if result.get("count").and_then(Value::as_u64).unwrap_or(0) == 0 {
        return None;
    }
    let metric = str_field(result, "metric").or_else(|| str_field(input, "metric"))?;
    let format = infer_format(Some(metric), None);

    if let Some(bands) = result
        .get("distribution")
        .and_then(Value::as_array)
        .filter(|bands| !bands.is_empty())
    {
        let data = bands
            .iter()
            .map(|band| DataPoint::new(label(band, "band"), num(band, "count")))
            .collect();
        return Some(
            Visualization::new(
                format!("{} Distribution", humanize(metric)),
                Chart::Bar(data),
                ValueFormat::Number,
            )
            .with_subtitle(format!("Median {}", format.format_value(num(result, "median"))))
            .with_value_label("Shipments"),
        );
    }

    Some(
        Visualization::new(
            format!("Average {}", humanize(metric)),
            Chart::Stat(StatData {
                value: num(result, "mean"),
                comparison: None,
            }),
            format,
        )
        .with_subtitle(format!(
            "Median {}, p90 {}",
            format.format_value(num(result, "median")),
            format.format_value(num(result, "p90"))
        ))
        .with_value_label(humanize(metric))
        .with_config("count", json!(num(result, "count")))
        .with_config("min", json!(num(result, "min")))
        .with_config("max", json!(num(result, "max"))),
    )
}

fn treemap_node(item: &Value) -> TreemapNode {
    TreemapNode {
        name: label(item, "name"),
        value: num(item, "value"),
        children: item
            .get("children")
            .and_then(Value::as_array)
            .map(|kids| kids.iter().map(treemap_node).collect())
            .unwrap_or_default(),
    }
}

fn map_hierarchy(input: &Value, result: &Value) -> Option<Visualization> {
    let items = rows(result, "items")?;
    let group_by = str_field(result, "group_by").or_else(|| str_field(input, "group_by"))?;
    let measure = Measure::of(input, result);

    let mut title = format!("{} by {}", measure.title(), humanize(group_by));
    if let Some(secondary) = str_field(result, "secondary_group_by") {
        title.push_str(&format!(" and {}", humanize(secondary)));
    }
    Some(
        Visualization::new(
            title,
            Chart::Treemap(items.iter().map(treemap_node).collect()),
            measure.format(),
        )
        .with_value_label(measure.value_label()),
    )
}

fn map_daily_activity(input: &Value, result: &Value) -> Option<Visualization> {
    let days = rows(result, "days")?;
    let measure = Measure::of(input, result);

    let cells = days
        .iter()
        .map(|d| HeatmapCell {
            x: label(d, "day_of_week"),
            y: label(d, "week"),
            value: num(d, "value"),
        })
        .collect();
    Some(
        Visualization::new(
            format!("Daily {}", measure.title()),
            Chart::Heatmap(cells),
            measure.format(),
        )
        .with_value_label(measure.value_label())
        .with_config("x_axis", json!("Day of Week"))
        .with_config("y_axis", json!("Week"))
        .with_config(
            "x_order",
            json!(["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]),
        ),
    )
}

fn map_geographic(input: &Value, result: &Value) -> Option<Visualization> {
    let regions = rows(result, "regions")?;
    let field = str_field(result, "region_field").unwrap_or("destination_state");
    let measure = Measure::of(input, result);

    let data = regions
        .iter()
        .map(|r| RegionValue {
            region: label(r, "region"),
            value: num(r, "value"),
        })
        .collect();
    Some(
        Visualization::new(
            format!("{} by {}", measure.title(), humanize(field)),
            Chart::Choropleth(data),
            measure.format(),
        )
        .with_value_label(measure.value_label())
        .with_config("region_field", json!(field)),
    )
}

fn map_flows(input: &Value, result: &Value) -> Option<Visualization> {
    let flows = rows(result, "flows")?;
    let measure = Measure::of(input, result);

    let data = flows
        .iter()
        .map(|f| Flow {
            origin: label(f, "origin"),
            destination: label(f, "destination"),
            value: num(f, "value"),
        })
        .collect();
    Some(
        Visualization::new(
            format!("{} by Lane", measure.title()),
            Chart::Flowmap(data),
            measure.format(),
        )
        .with_value_label(measure.value_label()),
    )
}

fn map_compare_metrics(input: &Value, result: &Value) -> Option<Visualization> {
    let groups = rows(result, "groups")?;
    let metrics: Vec<&str> = result
        .get("metrics")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let group_by = str_field(result, "group_by").or_else(|| str_field(input, "group_by"))?;

    let series = groups
        .iter()
        .map(|g| RadarSeries {
            label: label(g, "group"),
            values: metrics
                .iter()
                .map(|m| RadarAxis {
                    axis: humanize(m),
                    value: g
                        .get("normalized")
                        .map(|n| num(n, m))
                        .unwrap_or(0.0),
                })
                .collect(),
        })
        .collect();
    Some(
        Visualization::new(
            format!("{} Comparison", humanize(group_by)),
            Chart::Radar(series),
            ValueFormat::Number,
        )
        .with_subtitle(
            metrics
                .iter()
                .map(|m| humanize(m))
                .collect::<Vec<_>>()
                .join(", "),
        )
        .with_value_label("Score (0-100)"),
    )
}

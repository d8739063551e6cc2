//! The tool catalog offered to the reasoning backend.
//!
//! Descriptions are the only steering mechanism for tool selection, so each
//! one states its required inputs, its optional inputs and typical phrasings
//! that should trigger it. Adding a tool means adding an entry here, a
//! handler in [`crate::tools`] and a rule in [`crate::mapper`];
//! [`crate::Investigator`] refuses to start if the three disagree.

use std::sync::LazyLock;

use freightscope_llm::ToolDefinition;
use serde_json::{Value, json};

/// Bumped whenever a tool's name, input contract or result shape changes.
pub const TOOL_CATALOG_VERSION: &str = "2024.3";

pub const EXPLORE_FIELD: &str = "explore_field";
pub const PREVIEW_AGGREGATION: &str = "preview_aggregation";
pub const COMPARE_PERIODS: &str = "compare_periods";
pub const DETECT_ANOMALIES: &str = "detect_anomalies";
pub const ANALYZE_ROOT_CAUSE: &str = "analyze_root_cause";
pub const GET_TREND: &str = "get_trend";
pub const GET_SUMMARY_STATISTICS: &str = "get_summary_statistics";
pub const GET_HIERARCHICAL_DATA: &str = "get_hierarchical_data";
pub const GET_DAILY_ACTIVITY: &str = "get_daily_activity";
pub const GET_GEOGRAPHIC_DATA: &str = "get_geographic_data";
pub const GET_FLOW_DATA: &str = "get_flow_data";
pub const COMPARE_METRICS: &str = "compare_metrics";

const PERIOD_DOC: &str = "Symbolic period: today, yesterday, last7, last14, last30, last60, \
    last90, last180, last365, this_month, last_month, this_year, all.";
const AGGREGATION_VALUES: [&str; 6] = ["sum", "avg", "count", "count_distinct", "min", "max"];

fn period(default: &str) -> Value {
    json!({
        "type": "string",
        "description": format!("{} Default: {}.", PERIOD_DOC, default)
    })
}

fn metric(doc: &str) -> Value {
    json!({
        "type": "string",
        "description": format!(
            "{} Numeric field such as cost, retail, weight, transit_days, miles.",
            doc
        )
    })
}

fn aggregation(default: &str) -> Value {
    json!({
        "type": "string",
        "enum": AGGREGATION_VALUES,
        "description": format!("How values are combined. Default: {}.", default)
    })
}

fn filters() -> Value {
    json!({
        "type": "object",
        "description": "Optional equality filters, e.g. {\"carrier\": \"UPS\", \"mode\": \"LTL\"}.",
        "additionalProperties": true
    })
}

fn limit(default: u64, max: u64) -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": max,
        "description": format!("Maximum rows to return. Default: {}.", default)
    })
}

static CATALOG: LazyLock<Vec<ToolDefinition>> = LazyLock::new(|| {
    vec![
        ToolDefinition::new(
            EXPLORE_FIELD,
            "Profile one field: distinct value count, coverage (share of records where it is \
             set) and its most common values. REQUIRED: field. OPTIONAL: period, limit. Use it \
             before aggregating on an unfamiliar field, or for questions like 'what carriers do \
             we use', 'which modes appear in the data', 'how complete is the PO number field'.",
            json!({
                "type": "object",
                "properties": {
                    "field": {"type": "string", "description": "Field to profile, e.g. carrier, mode, origin_state."},
                    "period": period("all"),
                    "limit": limit(10, 50)
                },
                "required": ["field"]
            }),
        ),
        ToolDefinition::new(
            PREVIEW_AGGREGATION,
            "Group-and-aggregate shipments. REQUIRED: nothing (defaults to counting shipments \
             over the last 30 days). OPTIONAL: metric, aggregation, group_by, \
             secondary_group_by, period, filters, limit. Use for 'how many shipments last \
             month', 'total cost by carrier', 'average weight per mode', 'top lanes by volume'. \
             Without group_by it returns a single overall value.",
            json!({
                "type": "object",
                "properties": {
                    "metric": metric("Field to aggregate. Omit when counting shipments."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "group_by": {"type": "string", "description": "Field to group by, e.g. carrier."},
                    "secondary_group_by": {"type": "string", "description": "Second grouping field. Requires group_by."},
                    "period": period("last30"),
                    "filters": filters(),
                    "limit": limit(20, 100)
                }
            }),
        ),
        ToolDefinition::new(
            COMPARE_PERIODS,
            "Compare a metric between a period and the period before it (or an explicit \
             comparison period). REQUIRED: nothing. OPTIONAL: metric, aggregation, period, \
             compare_to, group_by, filters, limit. Returns current and previous values, the \
             change and percent change, and per-group changes when group_by is given. Use for \
             'how does this month compare to last month', 'did spend go up', 'week over week \
             volume'.",
            json!({
                "type": "object",
                "properties": {
                    "metric": metric("Field to compare. Omit to compare shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "compare_to": {"type": "string", "description": "'previous' (default) for the preceding period of equal length, or a symbolic period."},
                    "group_by": {"type": "string", "description": "Optional field for a per-group comparison."},
                    "filters": filters(),
                    "limit": limit(10, 50)
                }
            }),
        ),
        ToolDefinition::new(
            DETECT_ANOMALIES,
            "Find groups whose aggregated value is a statistical outlier (z-score beyond a \
             threshold of 2 standard deviations; 1.5 for high sensitivity, 3 for low). \
             REQUIRED: group_by. OPTIONAL: metric, aggregation, period, sensitivity, filters, \
             limit. Use for 'any unusual carriers', 'which lanes are outliers on cost', \
             'spot anomalies in detention charges'.",
            json!({
                "type": "object",
                "properties": {
                    "group_by": {"type": "string", "description": "Field whose groups are compared, e.g. carrier or lane."},
                    "metric": metric("Field to aggregate. Omit to use shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "sensitivity": {"type": "string", "enum": ["low", "medium", "high"], "description": "Default: medium."},
                    "filters": filters(),
                    "limit": limit(50, 200)
                },
                "required": ["group_by"]
            }),
        ),
        ToolDefinition::new(
            ANALYZE_ROOT_CAUSE,
            "Explain a change in a metric between two periods by breaking it down across one \
             or more dimensions and ranking the groups that contributed most. REQUIRED: \
             dimensions. OPTIONAL: metric, aggregation, period, compare_to, filters, top_n. \
             Use for 'why did costs go up', 'what drove the drop in volume', 'root cause of \
             higher transit times'.",
            json!({
                "type": "object",
                "properties": {
                    "dimensions": {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 5, "description": "Fields to break the change down by, e.g. [\"carrier\", \"origin_state\"]."},
                    "metric": metric("Field whose change is explained. Omit for shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "compare_to": {"type": "string", "description": "'previous' (default) or a symbolic period."},
                    "filters": filters(),
                    "top_n": {"type": "integer", "minimum": 1, "maximum": 20, "description": "Contributors kept per dimension. Default: 5."}
                },
                "required": ["dimensions"]
            }),
        ),
        ToolDefinition::new(
            GET_TREND,
            "Time series of a metric bucketed by day, week or month, with overall direction and \
             percent change. REQUIRED: nothing. OPTIONAL: metric, aggregation, period, \
             interval, filters. Use for 'cost trend', 'volume over time', 'are transit times \
             improving', 'monthly spend this year'.",
            json!({
                "type": "object",
                "properties": {
                    "metric": metric("Field to chart. Omit for shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last90"),
                    "interval": {"type": "string", "enum": ["day", "week", "month"], "description": "Bucket size. Default depends on period length."},
                    "filters": filters()
                }
            }),
        ),
        ToolDefinition::new(
            GET_SUMMARY_STATISTICS,
            "Descriptive statistics of a numeric field: count, sum, mean, median, min, max, \
             standard deviation and 90th percentile, plus an optional banded distribution. \
             REQUIRED: metric. OPTIONAL: period, filters, buckets. Use for 'typical shipment \
             weight', 'spread of freight cost', 'how many loads take 6+ days in transit'.",
            json!({
                "type": "object",
                "properties": {
                    "metric": metric("Field to describe."),
                    "period": period("last30"),
                    "filters": filters(),
                    "buckets": {
                        "type": "array",
                        "items": {"type": "number"},
                        "description": "Ascending lower edges of distribution bands. \
                            [0, 2, 4, 6] on transit_days gives 0-1, 2-3, 4-5 and 6+ days."
                    }
                },
                "required": ["metric"]
            }),
        ),
        ToolDefinition::new(
            GET_HIERARCHICAL_DATA,
            "Proportional breakdown of a metric by one field, optionally nested by a second \
             field, suited to treemaps. REQUIRED: group_by. OPTIONAL: secondary_group_by, \
             metric, aggregation, period, filters, limit. Use for 'treemap of cost by carrier', \
             'share of volume by mode and carrier', 'where does our spend go'.",
            json!({
                "type": "object",
                "properties": {
                    "group_by": {"type": "string", "description": "Top-level field, e.g. carrier."},
                    "secondary_group_by": {"type": "string", "description": "Nested field, e.g. mode."},
                    "metric": metric("Field to size by. Omit for shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "filters": filters(),
                    "limit": limit(10, 50)
                },
                "required": ["group_by"]
            }),
        ),
        ToolDefinition::new(
            GET_DAILY_ACTIVITY,
            "Per-day values across a bounded period, with empty days filled as zero, laid out \
             by weekday and week for heatmaps. REQUIRED: nothing. OPTIONAL: metric, \
             aggregation, period, filters. Use for 'which days are busiest', 'daily shipping \
             pattern', 'heatmap of activity'.",
            json!({
                "type": "object",
                "properties": {
                    "metric": metric("Field to total per day. Omit for shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "filters": filters()
                }
            }),
        ),
        ToolDefinition::new(
            GET_GEOGRAPHIC_DATA,
            "Aggregate a metric by region code (US state or country code) for choropleth maps. \
             REQUIRED: nothing. OPTIONAL: region_field, metric, aggregation, period, filters, \
             limit. Use for 'map of shipments by destination state', 'which states cost the \
             most', 'regional spend'.",
            json!({
                "type": "object",
                "properties": {
                    "region_field": {"type": "string", "description": "Field holding region codes. Default: destination_state."},
                    "metric": metric("Field to aggregate. Omit for shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "filters": filters(),
                    "limit": limit(60, 250)
                }
            }),
        ),
        ToolDefinition::new(
            GET_FLOW_DATA,
            "Origin-to-destination aggregates for flow maps, sorted by value. REQUIRED: \
             nothing. OPTIONAL: origin_field, destination_field, metric, aggregation, period, \
             filters, limit. Use for 'top lanes', 'where do shipments flow', 'map of lanes by \
             cost'.",
            json!({
                "type": "object",
                "properties": {
                    "origin_field": {"type": "string", "description": "Default: origin_state."},
                    "destination_field": {"type": "string", "description": "Default: destination_state."},
                    "metric": metric("Field to aggregate. Omit for shipment counts."),
                    "aggregation": aggregation("sum when a metric is given, otherwise count"),
                    "period": period("last30"),
                    "filters": filters(),
                    "limit": limit(25, 100)
                }
            }),
        ),
        ToolDefinition::new(
            COMPARE_METRICS,
            "Compare several metrics across the top groups of a field, with raw values and \
             values normalized to 0-100 per metric, suited to radar charts. REQUIRED: metrics \
             (2 to 6), group_by. OPTIONAL: aggregation, period, filters, limit. Use for \
             'compare carriers on cost, transit time and weight', 'carrier scorecard'.",
            json!({
                "type": "object",
                "properties": {
                    "metrics": {"type": "array", "items": {"type": "string"}, "minItems": 2, "maxItems": 6, "description": "Numeric fields to compare."},
                    "group_by": {"type": "string", "description": "Field whose groups are compared, e.g. carrier."},
                    "aggregation": aggregation("avg"),
                    "period": period("last30"),
                    "filters": filters(),
                    "limit": limit(5, 10)
                },
                "required": ["metrics", "group_by"]
            }),
        ),
    ]
});

/// All tool definitions, in a stable order.
pub fn tool_catalog() -> &'static [ToolDefinition] {
    &CATALOG
}

/// Look up one definition by name.
pub fn tool_definition(name: &str) -> Option<&'static ToolDefinition> {
    CATALOG.iter().find(|def| def.name == name)
}

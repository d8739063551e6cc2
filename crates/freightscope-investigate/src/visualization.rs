//! Renderer-agnostic visualization descriptors.
//!
//! A [`Visualization`] serializes as
//! `{id, type, title, subtitle?, data, format, value_label?, config}` where
//! the shape of `data` is fixed by `type`. Pairing type and data in one enum
//! makes a mismatched descriptor unrepresentable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One visualization produced from a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(flatten)]
    pub chart: Chart,
    pub format: ValueFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_label: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Visualization {
    /// Create a descriptor with a fresh id.
    pub fn new(title: impl Into<String>, chart: Chart, format: ValueFormat) -> Self {
        Self {
            id: format!("viz_{}", Uuid::new_v4().simple()),
            title: title.into(),
            subtitle: None,
            chart,
            format,
            value_label: None,
            config: Map::new(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_value_label(mut self, label: impl Into<String>) -> Self {
        self.value_label = Some(label.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn kind(&self) -> ChartKind {
        self.chart.kind()
    }

    /// Equality ignoring the generated id.
    pub fn same_content(&self, other: &Visualization) -> bool {
        Visualization {
            id: String::new(),
            ..self.clone()
        } == Visualization {
            id: String::new(),
            ..other.clone()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chart Data
// ─────────────────────────────────────────────────────────────────────────────

/// Chart type together with its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Chart {
    Bar(Vec<DataPoint>),
    Line(Vec<DataPoint>),
    Pie(Vec<DataPoint>),
    Stat(StatData),
    Treemap(Vec<TreemapNode>),
    Heatmap(Vec<HeatmapCell>),
    Choropleth(Vec<RegionValue>),
    Flowmap(Vec<Flow>),
    Radar(Vec<RadarSeries>),
}

/// Chart type without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Stat,
    Treemap,
    Heatmap,
    Choropleth,
    Flowmap,
    Radar,
}

impl Chart {
    pub fn kind(&self) -> ChartKind {
        match self {
            Chart::Bar(_) => ChartKind::Bar,
            Chart::Line(_) => ChartKind::Line,
            Chart::Pie(_) => ChartKind::Pie,
            Chart::Stat(_) => ChartKind::Stat,
            Chart::Treemap(_) => ChartKind::Treemap,
            Chart::Heatmap(_) => ChartKind::Heatmap,
            Chart::Choropleth(_) => ChartKind::Choropleth,
            Chart::Flowmap(_) => ChartKind::Flowmap,
            Chart::Radar(_) => ChartKind::Radar,
        }
    }

    /// Number of data entries; a stat counts as one.
    pub fn len(&self) -> usize {
        match self {
            Chart::Bar(d) | Chart::Line(d) | Chart::Pie(d) => d.len(),
            Chart::Stat(_) => 1,
            Chart::Treemap(d) => d.len(),
            Chart::Heatmap(d) => d.len(),
            Chart::Choropleth(d) => d.len(),
            Chart::Flowmap(d) => d.len(),
            Chart::Radar(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

impl DataPoint {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatData {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<StatComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatComparison {
    pub value: f64,
    pub label: String,
    /// `up`, `down` or `flat`.
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreemapNode {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreemapNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub x: String,
    pub y: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionValue {
    pub region: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub origin: String,
    pub destination: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarSeries {
    pub label: String,
    pub values: Vec<RadarAxis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarAxis {
    pub axis: String,
    pub value: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Formatting
// ─────────────────────────────────────────────────────────────────────────────

/// How values should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Currency,
    Percent,
    #[default]
    Number,
}

impl ValueFormat {
    /// Render a value for text such as subtitles.
    pub fn format_value(&self, value: f64) -> String {
        match self {
            ValueFormat::Currency => {
                let sign = if value < 0.0 { "-" } else { "" };
                format!("{}${}", sign, group_thousands(value.abs(), 2))
            }
            ValueFormat::Percent => format!("{:.1}%", value),
            ValueFormat::Number => {
                let decimals = if value.fract() == 0.0 { 0 } else { 2 };
                let sign = if value < 0.0 { "-" } else { "" };
                format!("{}{}", sign, group_thousands(value.abs(), decimals))
            }
        }
    }
}

fn group_thousands(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(frac) => format!("{}.{}", grouped, frac),
        None => grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let viz = Visualization::new(
            "Total Cost by Carrier",
            Chart::Bar(vec![DataPoint::new("UPS", 10.0)]),
            ValueFormat::Currency,
        )
        .with_value_label("Cost");
        let json = serde_json::to_value(&viz).unwrap();

        assert_eq!(json["type"], "bar");
        assert_eq!(json["data"][0]["label"], "UPS");
        assert_eq!(json["format"], "currency");
        assert_eq!(json["value_label"], "Cost");
        assert!(json["id"].as_str().unwrap().starts_with("viz_"));
        assert!(json.get("subtitle").is_none());
    }

    #[test]
    fn test_deserialize_matches_declared_type() {
        let viz = Visualization::new(
            "Average Cost",
            Chart::Stat(StatData {
                value: 12.5,
                comparison: Some(StatComparison {
                    value: 10.0,
                    label: "previous period".into(),
                    direction: "up".into(),
                }),
            }),
            ValueFormat::Currency,
        );
        let json = serde_json::to_string(&viz).unwrap();
        let back: Visualization = serde_json::from_str(&json).unwrap();
        assert_eq!(back, viz);
        assert_eq!(back.kind(), ChartKind::Stat);
    }

    #[test]
    fn test_type_data_mismatch_rejected() {
        let bad = serde_json::json!({
            "id": "viz_1",
            "title": "x",
            "type": "treemap",
            "data": {"value": 1.0},
            "format": "number"
        });
        assert!(serde_json::from_value::<Visualization>(bad).is_err());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(ValueFormat::Currency.format_value(1234.567), "$1,234.57");
        assert_eq!(ValueFormat::Currency.format_value(-50.0), "-$50.00");
        assert_eq!(ValueFormat::Percent.format_value(12.345), "12.3%");
        assert_eq!(ValueFormat::Number.format_value(1234567.0), "1,234,567");
        assert_eq!(ValueFormat::Number.format_value(42.5), "42.50");
        assert_eq!(ValueFormat::Number.format_value(999.0), "999");
    }

    #[test]
    fn test_same_content_ignores_id() {
        let a = Visualization::new("t", Chart::Pie(vec![]), ValueFormat::Number);
        let b = Visualization::new("t", Chart::Pie(vec![]), ValueFormat::Number);
        assert_ne!(a.id, b.id);
        assert!(a.same_content(&b));
    }
}

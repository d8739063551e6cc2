//! Field profiling.

use async_trait::async_trait;
use freightscope_store::{AnalyticsStore, FieldQuery, normalize};
use serde_json::{Value, json};

use super::{ParamExt, ToolContext, ToolHandler, parse_filters, parse_limit, parse_period, round2};
use crate::catalog::EXPLORE_FIELD;
use crate::error::ToolResult;

/// Cardinality, coverage and top values of one field.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExploreField;

#[async_trait]
impl ToolHandler for ExploreField {
    fn name(&self) -> &'static str {
        EXPLORE_FIELD
    }

    fn empty_result(&self) -> Value {
        json!({
            "field": null,
            "distinct_count": 0,
            "total_records": 0,
            "coverage": 0,
            "top_values": []
        })
    }

    async fn run(
        &self,
        input: &Value,
        store: &dyn AnalyticsStore,
        ctx: &ToolContext,
    ) -> ToolResult<Value> {
        let field = input.required_str("field", "the field to profile, e.g. carrier or mode")?;
        let period = parse_period(input, "all")?;
        let query = FieldQuery::new(&ctx.customer_id, field)
            .with_range(period.resolve(ctx.today))
            .with_filters(parse_filters(input)?)
            .with_limit(parse_limit(input, 10, 50));

        let envelope = store.explore_field(query).await?;
        let profile = normalize::field_profile(field, &envelope)?;

        let share = |count: u64, of: u64| {
            if of == 0 {
                0.0
            } else {
                round2(count as f64 / of as f64 * 100.0)
            }
        };
        let denominator = if profile.populated > 0 {
            profile.populated
        } else {
            profile.total_records
        };

        let top_values: Vec<Value> = profile
            .top_values
            .iter()
            .map(|v| {
                json!({
                    "value": v.value,
                    "count": v.count,
                    "percent": share(v.count, denominator),
                })
            })
            .collect();

        Ok(json!({
            "field": profile.field,
            "period": period.label(),
            "distinct_count": profile.distinct_count,
            "total_records": profile.total_records,
            "coverage": share(profile.populated, profile.total_records),
            "top_values": top_values,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::ctx;
    use freightscope_store::{MockStore, StoreCall};

    #[tokio::test]
    async fn test_profile_with_coverage() {
        let store = MockStore::new().with_explore(json!({
            "field": "carrier",
            "distinct_count": 3,
            "total_records": 200,
            "populated": 150,
            "top_values": [
                {"value": "UPS", "count": 90},
                {"value": "FedEx", "count": 60}
            ]
        }));
        let result = ExploreField
            .run(&json!({"field": "carrier"}), &store, &ctx())
            .await
            .unwrap();

        assert_eq!(result["coverage"], 75.0);
        assert_eq!(result["period"], "all");
        assert_eq!(result["top_values"][0]["percent"], 60.0);
        assert_eq!(result["distinct_count"], 3);

        match &store.calls()[0] {
            StoreCall::Explore(query) => {
                assert!(query.range.is_none());
                assert_eq!(query.limit, 10);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requires_field() {
        let err = ExploreField
            .run(&json!({}), &MockStore::new(), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'field'"));
    }
}

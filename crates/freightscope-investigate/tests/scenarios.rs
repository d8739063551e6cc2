//! End-to-end investigations with a scripted backend and real tool handlers.

use std::sync::Arc;

use chrono::NaiveDate;
use freightscope_investigate::{
    ChartKind, InvestigationMode, InvestigationRequest, InvestigationResult, Investigator,
    Termination, Visualization, VisualizationMapper, tool_catalog,
};
use freightscope_llm::{Content, ContentBlock, Message, MockBackend};
use freightscope_store::{DatasetStore, MockStore, SharedStore};
use serde_json::{Value, json};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn investigator(backend: Arc<MockBackend>, store: SharedStore) -> Investigator {
    Investigator::builder()
        .with_backend(backend)
        .with_store(store)
        .with_today(today())
        .build()
        .unwrap()
}

/// Tool results sent back to the backend in the last message of a request.
fn tool_results(message: &Message) -> Vec<(String, bool)> {
    let Content::Blocks(blocks) = &message.content else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => Some((content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

/// 42 February shipments for acme, plus noise outside the period and tenant.
fn february_dataset() -> DatasetStore {
    let mut records: Vec<Value> = (0..42)
        .map(|i| {
            json!({
                "customer_id": "acme",
                "ship_date": format!("2024-02-{:02}", i % 28 + 1),
                "carrier": if i % 3 == 0 { "UPS" } else { "FedEx" },
                "cost": 100.0 + i as f64,
            })
        })
        .collect();
    records.push(json!({"customer_id": "acme", "ship_date": "2024-03-02", "carrier": "UPS", "cost": 10.0}));
    records.push(json!({"customer_id": "globex", "ship_date": "2024-02-10", "carrier": "UPS", "cost": 10.0}));
    DatasetStore::new(records).unwrap()
}

#[tokio::test]
async fn quick_count_question_answers_from_the_store() {
    let backend = Arc::new(MockBackend::new(vec![
        MockBackend::tool_response(
            "toolu_1",
            "preview_aggregation",
            json!({"period": "last_month"}),
        ),
        MockBackend::text_response(
            "You had 42 shipments last month.\n\n\
             Follow-up questions:\n\
             - Which carrier handled the most of them?\n\
             - How does that compare to January?",
        ),
    ]));
    let result = investigator(backend.clone(), Arc::new(february_dataset()))
        .investigate(InvestigationRequest::new("How many shipments last month?", "acme"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.metadata.mode, InvestigationMode::Quick);
    assert_eq!(result.metadata.classification.mode, InvestigationMode::Quick);
    assert!(result.answer.contains("42"));
    assert!(!result.answer.contains("Follow-up"));
    assert!(result.visualizations.is_empty());
    assert!(!result.follow_up_questions.is_empty());
    assert_eq!(
        result.follow_up_questions[0].question,
        "Which carrier handled the most of them?"
    );
    assert_eq!(result.metadata.tool_call_count, 1);
    assert_eq!(result.metadata.iterations, 2);

    let requests = backend.requests();
    let results = tool_results(requests[1].messages.last().unwrap());
    assert_eq!(results.len(), 1);
    let (content, is_error) = &results[0];
    assert!(!is_error);
    let sent: Value = serde_json::from_str(content).unwrap();
    assert_eq!(sent["total"], 42.0);
    assert_eq!(sent["record_count"], 42);
}

#[tokio::test]
async fn treemap_request_produces_one_treemap() {
    let carriers = json!({"data": {"groups": [
        {"key": "UPS", "total": 5200.0, "doc_count": 40},
        {"key": "FedEx", "total": 4100.0, "doc_count": 31},
        {"key": "DHL", "total": 2300.0, "doc_count": 18},
        {"key": "XPO", "total": 1900.0, "doc_count": 12},
        {"key": "Saia", "total": 800.0, "doc_count": 7}
    ]}});
    let backend = Arc::new(MockBackend::new(vec![
        MockBackend::tool_response(
            "toolu_1",
            "get_hierarchical_data",
            json!({"group_by": "carrier", "metric": "cost"}),
        ),
        MockBackend::text_response("UPS accounts for the largest share of cost."),
    ]));
    let result = investigator(
        backend,
        Arc::new(MockStore::new().with_aggregate(carriers)),
    )
    .investigate(InvestigationRequest::new("Show me a treemap of cost by carrier", "acme"))
    .await
    .unwrap();

    assert_eq!(result.metadata.mode, InvestigationMode::Visual);
    assert_eq!(result.visualizations.len(), 1);
    let viz = &result.visualizations[0];
    assert_eq!(viz.kind(), ChartKind::Treemap);
    assert_eq!(viz.chart.len(), 5);
    assert!(viz.title.contains("Cost"));
    assert!(viz.title.contains("Carrier"));
}

#[tokio::test]
async fn store_failure_is_fed_back_and_the_loop_continues() {
    let backend = Arc::new(MockBackend::new(vec![
        MockBackend::tool_response(
            "toolu_1",
            "preview_aggregation",
            json!({"group_by": "carrier"}),
        ),
        MockBackend::text_response("The data store is unavailable right now."),
    ]));
    let store = Arc::new(MockStore::new().with_aggregate_error("warehouse offline"));
    let result = investigator(backend.clone(), store)
        .investigate(InvestigationRequest::new("How many shipments per carrier?", "acme"))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.visualizations.is_empty());
    assert_eq!(result.metadata.iterations, 2);
    assert_eq!(result.metadata.termination, Termination::Completed);

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let results = tool_results(requests[1].messages.last().unwrap());
    let (content, is_error) = &results[0];
    assert!(is_error);
    let sent: Value = serde_json::from_str(content).unwrap();
    assert!(sent["error"].as_str().unwrap().contains("warehouse offline"));
    assert_eq!(sent["groups"], json!([]));
}

#[tokio::test]
async fn quick_mode_never_exceeds_three_backend_calls() {
    let backend = Arc::new(MockBackend::repeating(MockBackend::tool_response(
        "toolu_1",
        "explore_field",
        json!({"field": "carrier"}),
    )));
    let result = investigator(backend.clone(), Arc::new(february_dataset()))
        .investigate(InvestigationRequest::new("How many shipments last month?", "acme"))
        .await
        .unwrap();

    assert_eq!(backend.request_count(), 3);
    assert_eq!(result.metadata.termination, Termination::BudgetExhausted);
    assert_eq!(result.follow_up_questions.len(), 3);
}

#[tokio::test]
async fn response_round_trips_through_json() {
    let backend = Arc::new(MockBackend::new(vec![
        MockBackend::tool_response(
            "toolu_1",
            "get_trend",
            json!({"metric": "cost", "period": "last90"}),
        ),
        MockBackend::text_response("Costs are climbing."),
    ]));
    let result = investigator(backend, Arc::new(february_dataset()))
        .investigate(
            InvestigationRequest::new("Show the cost trend over time", "acme")
                .with_show_reasoning(false),
        )
        .await
        .unwrap();

    assert!(result.reasoning.is_empty());
    assert_eq!(result.visualizations.len(), 1);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["metadata"]["classification"]["detected"], "visual");
    assert_eq!(json["visualizations"][0]["type"], "line");
    assert!(json["metadata"]["iterations"].is_u64());

    let back: InvestigationResult = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
    for viz in &back.visualizations {
        let again: Visualization =
            serde_json::from_str(&serde_json::to_string(viz).unwrap()).unwrap();
        assert_eq!(again.kind(), viz.kind());
    }
}

#[test]
fn every_chart_kind_round_trips_through_json() {
    let cases = [
        (
            "preview_aggregation",
            json!({"group_by": "carrier", "metric": "cost", "aggregation": "sum",
                   "groups": [{"group": "UPS", "value": 10.0, "count": 1}]}),
            ChartKind::Bar,
            "bar",
        ),
        (
            "get_trend",
            json!({"metric": "cost", "aggregation": "sum", "interval": "month",
                   "series": [{"period": "2024-01", "value": 1.0, "count": 1},
                              {"period": "2024-02", "value": 2.0, "count": 1}],
                   "trend": {"direction": "up", "percent_change": 100.0}}),
            ChartKind::Line,
            "line",
        ),
        (
            "explore_field",
            json!({"field": "mode", "distinct_count": 2, "coverage": 100.0,
                   "top_values": [{"value": "LTL", "count": 5}, {"value": "FTL", "count": 2}]}),
            ChartKind::Pie,
            "pie",
        ),
        (
            "compare_periods",
            json!({"metric": "cost", "aggregation": "sum", "current_value": 1500.0,
                   "previous_value": 1000.0, "percent_change": 50.0, "direction": "up"}),
            ChartKind::Stat,
            "stat",
        ),
        (
            "get_hierarchical_data",
            json!({"group_by": "carrier", "metric": "cost", "aggregation": "sum",
                   "items": [{"name": "UPS", "value": 3.0, "count": 3,
                              "children": [{"name": "LTL", "value": 1.0, "count": 1}]}]}),
            ChartKind::Treemap,
            "treemap",
        ),
        (
            "get_daily_activity",
            json!({"days": [{"date": "2024-03-11", "day_of_week": "Mon",
                             "week": "2024-W11", "value": 4.0}]}),
            ChartKind::Heatmap,
            "heatmap",
        ),
        (
            "get_geographic_data",
            json!({"region_field": "destination_state", "metric": "cost", "aggregation": "sum",
                   "regions": [{"region": "OH", "value": 12.5, "count": 2}]}),
            ChartKind::Choropleth,
            "choropleth",
        ),
        (
            "get_flow_data",
            json!({"metric": "cost", "aggregation": "sum",
                   "flows": [{"origin": "OH", "destination": "TX", "value": 7.0, "count": 1}]}),
            ChartKind::Flowmap,
            "flowmap",
        ),
        (
            "compare_metrics",
            json!({"group_by": "carrier", "metrics": ["cost", "transit_days"],
                   "groups": [{"group": "UPS", "values": {"cost": 2.0, "transit_days": 1.0},
                               "normalized": {"cost": 100.0, "transit_days": 50.0}}]}),
            ChartKind::Radar,
            "radar",
        ),
    ];

    let mapper = VisualizationMapper::new();
    for (tool, result, kind, wire_type) in cases {
        let viz = mapper
            .map(tool, &json!({}), &result)
            .unwrap_or_else(|| panic!("{} produced no visualization", tool));
        assert_eq!(viz.kind(), kind, "{}", tool);

        let json = serde_json::to_value(&viz).unwrap();
        assert_eq!(json["type"], wire_type, "{}", tool);

        let back: Visualization = serde_json::from_value(json).unwrap();
        assert_eq!(back, viz, "{}", tool);
    }
}

#[test]
fn every_catalog_tool_is_offered() {
    let investigator = investigator(
        Arc::new(MockBackend::with_text("ok")),
        Arc::new(MockStore::new()),
    );
    assert_eq!(investigator.tool_definitions(), tool_catalog());
    assert_eq!(investigator.executor().len(), tool_catalog().len());
}

//! API integration tests against a running server.

mod common;

use anyhow::Result;
use freightscope_llm::MockBackend;
use freightscope_store::MockStore;
use serde_json::{Value, json};

#[tokio::test]
async fn test_health_returns_version() -> Result<()> {
    let server = common::TestServer::start().await?;

    let resp = server.get("/health").send().await?;
    assert!(resp.status().is_success());

    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());

    server.stop().await
}

#[tokio::test]
async fn test_tools_lists_catalog() -> Result<()> {
    let server = common::TestServer::start().await?;

    let body: Value = server.get("/api/v1/tools").send().await?.json().await?;
    assert_eq!(body["version"], freightscope_investigate::TOOL_CATALOG_VERSION);

    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 12);
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"get_hierarchical_data"));
    assert!(tools.iter().all(|t| t["input_schema"].is_object()));

    server.stop().await
}

#[tokio::test]
async fn test_investigate_returns_full_response() -> Result<()> {
    let backend = MockBackend::new(vec![
        MockBackend::tool_response(
            "toolu_1",
            "preview_aggregation",
            json!({"group_by": "carrier", "metric": "cost"}),
        ),
        MockBackend::text_response(
            "UPS costs the most at $500.00.\n\nFollow-up questions:\n\
             1. How has UPS cost changed this quarter?\n\
             2. Which lanes drive the UPS spend?",
        ),
    ]);
    let store = MockStore::new().with_aggregate(json!({"groups": [
        {"group": "UPS", "value": 500.0, "count": 10},
        {"group": "FedEx", "value": 300.0, "count": 6}
    ]}));
    let server = common::TestServer::start_with(backend, store).await?;

    let resp = server
        .post("/api/v1/investigate")
        .json(&json!({
            "question": "Compare cost by carrier",
            "customer_id": "acme",
            "user_id": "u-1"
        }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = resp.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["answer"], "UPS costs the most at $500.00.");
    assert_eq!(body["follow_up_questions"][1]["id"], "followup_2");
    assert_eq!(body["visualizations"][0]["type"], "bar");
    assert_eq!(body["visualizations"][0]["format"], "currency");
    assert_eq!(body["metadata"]["tool_call_count"], 1);
    assert_eq!(body["metadata"]["iterations"], 2);
    assert_eq!(body["metadata"]["classification"]["detected"], "visual");

    let kinds: Vec<&str> = body["reasoning"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["type"].as_str())
        .collect();
    assert_eq!(kinds, vec!["routing", "tool_call", "tool_result", "thinking"]);

    assert_eq!(server.store.call_count(), 1);
    server.stop().await
}

#[tokio::test]
async fn test_investigate_hides_reasoning_on_request() -> Result<()> {
    let server = common::TestServer::start().await?;

    let body: Value = server
        .post("/api/v1/investigate")
        .json(&json!({
            "question": "How many shipments?",
            "customer_id": "acme",
            "preferences": {"show_reasoning": false, "force_mode": "deep"}
        }))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["reasoning"], json!([]));
    assert_eq!(body["metadata"]["mode"], "deep");
    assert_eq!(server.backend.requests()[0].max_tokens, 8192);

    server.stop().await
}

#[tokio::test]
async fn test_investigate_rejects_missing_fields() -> Result<()> {
    let server = common::TestServer::start().await?;

    let resp = server
        .post("/api/v1/investigate")
        .json(&json!({"question": "  ", "customer_id": "acme"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await?;
    assert_eq!(body["code"], "bad_request");

    assert_eq!(server.backend.request_count(), 0);
    server.stop().await
}

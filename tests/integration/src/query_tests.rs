//! Query and status endpoints against a live node

use crate::test_utils::*;
use serde_json::{json, Value};

#[tokio::test]
async fn test_status_reports_running() {
    let node = TestNode::start().await;

    let response = reqwest::get(format!("{}/status", node.http_url)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "service": "RUNNING" }));

    let response = reqwest::Client::new()
        .post(format!("{}/status", node.http_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    node.stop().await;
}

#[tokio::test]
async fn test_agreements_reflect_ingested_records() {
    let node = TestNode::start().await;
    let mut client = node.grpc_client().await;

    let mut second_agreement = reading("r2", "pmu-a", &["pmu-b"]);
    second_agreement.agreement_id = "agreement-2".to_string();
    let mut malformed = reading("r3", "pmu-a", &["pmu-b"]);
    malformed.lat = 0.0;

    let records = vec![
        reading("r1", "pmu-a", &["pmu-b"]),
        reading("r1", "pmu-b", &["pmu-a"]),
        second_agreement,
        malformed,
    ];
    let mut replies = client
        .store(tokio_stream::iter(records))
        .await
        .unwrap()
        .into_inner();
    let summary = replies.message().await.unwrap().unwrap();
    assert_eq!(summary.admitted, 3);
    assert_eq!(summary.rejected, 1);

    let body: Value = reqwest::get(format!("{}/agreements", node.http_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["lat"], 45.52);
    assert_eq!(entries[0]["lon"], -122.68);

    let contracts = entries[0]["contracts"].as_array().unwrap();
    let ids: Vec<_> = contracts.iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["agreement-1", "agreement-2"]);
    for contract in contracts {
        assert_eq!(contract["type"], 19);
        assert!(contract["ts"].as_i64().unwrap() > 0);
        assert!(contract.get("deviceId").is_none());
    }

    drop(replies);
    drop(client);
    node.stop().await;
}

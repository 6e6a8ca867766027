//! SSE streaming tests: `message/stream` frame order and `[DONE]`
//! termination, plus `tasks/resubscribe`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{message_send_request, rpc, start_test_server, test_card, EchoAgent, SlowAgent};
use serde_json::{json, Value};

use a2a_server::config::ServerConfig;

/// Split an SSE body into its `data:` payloads, keep-alive comments
/// excluded.
fn data_frames(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|s| s.to_string())
        .collect()
}

#[tokio::test]
async fn message_stream_emits_task_then_updates_then_done() {
    let (base_url, _handle) = start_test_server(
        Arc::new(EchoAgent),
        test_card("stream-echo"),
        ServerConfig::default(),
    )
    .await;
    let client = reqwest::Client::new();

    let body = json!({
        "jsonrpc": "2.0",
        "method": "message/stream",
        "params": {
            "message": {
                "messageId": "m1",
                "role": "user",
                "kind": "message",
                "parts": [{"kind": "text", "text": "hi"}]
            }
        },
        "id": 1
    });

    let response = client
        .post(format!("{}/a2a/rpc", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.contains("text/event-stream"), "{}", content_type);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );

    let text = response.text().await.unwrap();
    let frames = data_frames(&text);
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));

    // Every frame before [DONE] is a JSON-RPC success envelope echoing the
    // request id.
    let events: Vec<Value> = frames[..frames.len() - 1]
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    assert!(events.len() >= 3, "expected task + 2 updates, got {:?}", events);
    for envelope in &events {
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["id"], 1);
        assert!(envelope.get("error").is_none());
    }

    assert_eq!(events[0]["result"]["kind"], "task");
    assert_eq!(events[0]["result"]["status"]["state"], "submitted");
    assert_eq!(events[1]["result"]["kind"], "status-update");
    assert_eq!(events[1]["result"]["status"]["state"], "working");
    let last = &events[events.len() - 1]["result"];
    assert_eq!(last["kind"], "status-update");
    assert_eq!(last["status"]["state"], "completed");
    assert_eq!(last["final"], true);
}

#[tokio::test]
async fn resubscribe_replays_current_state_first() {
    let (base_url, _handle) = start_test_server(
        Arc::new(EchoAgent),
        test_card("stream-resub-terminal"),
        ServerConfig::default(),
    )
    .await;
    let client = reqwest::Client::new();

    // Complete a task first.
    let send = rpc(&client, &base_url, &message_send_request(1, "hi")).await;
    let task_id = send["result"]["taskId"].as_str().unwrap().to_string();

    // Resubscribing to a terminal task yields its snapshot and [DONE].
    let body = json!({
        "jsonrpc": "2.0",
        "method": "tasks/resubscribe",
        "params": {"id": task_id},
        "id": 2
    });
    let text = client
        .post(format!("{}/a2a/rpc", base_url))
        .json(&body)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames = data_frames(&text);
    assert_eq!(frames.len(), 2);
    let envelope: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(envelope["result"]["kind"], "task");
    assert_eq!(envelope["result"]["status"]["state"], "completed");
    assert_eq!(frames[1], "[DONE]");
}

/// Scenario: a live subscriber observes the canceled status before its
/// stream closes.
#[tokio::test]
async fn resubscriber_observes_cancellation() {
    let (base_url, _handle) = start_test_server(
        Arc::new(SlowAgent),
        test_card("stream-resub-cancel"),
        ServerConfig::default(),
    )
    .await;
    let client = reqwest::Client::new();

    // Long-running task, non-blocking submit.
    let mut send_body = message_send_request(1, "run forever");
    send_body["params"]["blocking"] = json!(false);
    let send = rpc(&client, &base_url, &send_body).await;
    let task_id = send["result"]["id"].as_str().unwrap().to_string();

    // Attach a live subscriber.
    let resub_body = json!({
        "jsonrpc": "2.0",
        "method": "tasks/resubscribe",
        "params": {"id": task_id},
        "id": 2
    });
    let resub_response = client
        .post(format!("{}/a2a/rpc", base_url))
        .json(&resub_body)
        .send()
        .await
        .unwrap();
    let collector = tokio::spawn(async move { resub_response.text().await.unwrap() });

    // Let the subscription settle, then cancel.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let cancel = rpc(
        &client,
        &base_url,
        &json!({"jsonrpc": "2.0", "method": "tasks/cancel", "params": {"id": task_id}, "id": 3}),
    )
    .await;
    assert_eq!(cancel["result"]["status"]["state"], "canceled");

    let text = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .expect("stream should close after cancellation")
        .unwrap();
    let frames = data_frames(&text);
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));

    let states: Vec<String> = frames[..frames.len() - 1]
        .iter()
        .map(|f| serde_json::from_str::<Value>(f).unwrap())
        .map(|e| e["result"]["status"]["state"].as_str().unwrap_or_default().to_string())
        .collect();
    // First frame is the snapshot; its state depends on how far the agent got.
    assert!(
        matches!(states.first().map(String::as_str), Some("submitted") | Some("working")),
        "states: {:?}",
        states
    );
    assert!(states.iter().any(|s| s == "canceled"), "states: {:?}", states);
}

#[tokio::test]
async fn resubscribe_unknown_task_is_error_envelope() {
    let (base_url, _handle) = start_test_server(
        Arc::new(EchoAgent),
        test_card("stream-resub-404"),
        ServerConfig::default(),
    )
    .await;
    let client = reqwest::Client::new();

    let response = rpc(
        &client,
        &base_url,
        &json!({"jsonrpc": "2.0", "method": "tasks/resubscribe", "params": {"id": "ghost"}, "id": 1}),
    )
    .await;
    assert_eq!(response["error"]["code"], -32001);
}

#[tokio::test]
async fn streaming_is_rejected_when_capability_disabled() {
    let config = ServerConfig {
        streaming_enabled: false,
        ..Default::default()
    };
    let (base_url, _handle) = start_test_server(
        Arc::new(EchoAgent),
        test_card("stream-disabled"),
        config,
    )
    .await;
    let client = reqwest::Client::new();

    let body = json!({
        "jsonrpc": "2.0",
        "method": "message/stream",
        "params": {
            "message": {
                "messageId": "m1",
                "role": "user",
                "kind": "message",
                "parts": [{"kind": "text", "text": "hi"}]
            }
        },
        "id": 1
    });
    let response: Value = rpc(&client, &base_url, &body).await;
    assert_eq!(response["error"]["code"], -32009);
}

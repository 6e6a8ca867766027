//! Wire-format round-trip tests: camelCase JSON in, equal object out.
//!
//! Structural equality is checked by re-encoding the decoded value and
//! comparing JSON trees, which also proves unknown-field tolerance drops
//! nothing that was known.

use serde_json::{json, Value};

use a2a_server::types::{AgentCard, Artifact, Event, Message, Task, TaskPushNotificationConfig};

fn round_trip<T>(value: Value) -> Value
where
    T: serde::de::DeserializeOwned + serde::Serialize,
{
    let decoded: T = serde_json::from_value(value).expect("decode");
    serde_json::to_value(&decoded).expect("re-encode")
}

#[test]
fn task_round_trips_structurally() {
    let task = json!({
        "id": "t1",
        "contextId": "ctx1",
        "kind": "task",
        "status": {
            "state": "working",
            "progress": 0.5,
            "updatedAt": "2026-07-01T10:00:00+00:00"
        },
        "artifacts": [{
            "artifactId": "a1",
            "name": "report",
            "parts": [{"kind": "text", "text": "chapter one"}]
        }],
        "history": [{
            "messageId": "m1",
            "role": "user",
            "kind": "message",
            "parts": [{"kind": "text", "text": "hi"}],
            "taskId": "t1"
        }],
        "metadata": {"origin": "test"}
    });
    assert_eq!(round_trip::<Task>(task.clone()), task);
}

#[test]
fn message_with_all_part_kinds_round_trips() {
    let message = json!({
        "messageId": "m1",
        "role": "agent",
        "kind": "message",
        "parts": [
            {"kind": "text", "text": "hello"},
            {"kind": "file", "file": {"bytes": "AQID", "mimeType": "application/octet-stream", "name": "blob.bin"}},
            {"kind": "file", "file": {"uri": "https://example.com/f.pdf", "mimeType": "application/pdf"}},
            {"kind": "data", "data": {"answer": 42}}
        ],
        "contextId": "ctx1",
        "referenceTaskIds": ["t0"]
    });
    assert_eq!(round_trip::<Message>(message.clone()), message);
}

#[test]
fn artifact_round_trips() {
    let artifact = json!({
        "artifactId": "a1",
        "name": "summary",
        "description": "Run summary",
        "parts": [{"kind": "text", "text": "done"}],
        "extensions": ["urn:example:ext"]
    });
    assert_eq!(round_trip::<Artifact>(artifact.clone()), artifact);
}

#[test]
fn agent_card_round_trips() {
    let card = json!({
        "name": "Echo",
        "description": "Echoes input",
        "version": "1.2.3",
        "url": "https://agent.example.com/a2a",
        "preferredTransport": "JSONRPC",
        "skills": [{
            "id": "echo",
            "name": "Echo",
            "description": "Returns the input",
            "tags": ["text"],
            "inputModes": ["text/plain"]
        }],
        "capabilities": {
            "streaming": true,
            "pushNotifications": true,
            "stateTransitionHistory": false,
            "extensions": ["urn:example:ext"]
        },
        "defaultInputModes": ["text/plain"],
        "defaultOutputModes": ["text/plain", "application/json"],
        "securitySchemes": {
            "bearer": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}
        },
        "provider": {"organization": "Example", "url": "https://example.com"},
        "protocolVersion": "0.3.0",
        "supportsAuthenticatedExtendedCard": true,
        "documentationUrl": "https://example.com/docs"
    });
    assert_eq!(round_trip::<AgentCard>(card.clone()), card);
}

#[test]
fn push_config_round_trips_with_each_auth_kind() {
    for auth in [
        json!({"type": "bearer", "token": "tok"}),
        json!({"type": "basic", "username": "u", "password": "p"}),
        json!({"type": "api_key", "headerName": "X-Key", "key": "k"}),
        json!({"type": "custom", "headers": {"X-One": "1"}}),
    ] {
        let config = json!({
            "taskId": "t1",
            "pushNotificationConfig": {
                "id": "cfg1",
                "url": "https://hooks.example.com/a2a",
                "authentication": auth
            }
        });
        assert_eq!(
            round_trip::<TaskPushNotificationConfig>(config.clone()),
            config
        );
    }
}

#[test]
fn events_round_trip_through_kind_dispatch() {
    for event in [
        json!({
            "id": "t1",
            "contextId": "ctx1",
            "kind": "task",
            "status": {"state": "submitted", "updatedAt": "2026-07-01T10:00:00+00:00"}
        }),
        json!({
            "taskId": "t1",
            "contextId": "ctx1",
            "kind": "status-update",
            "status": {"state": "completed", "result": {"echo": "hi"},
                       "updatedAt": "2026-07-01T10:00:01+00:00"},
            "final": true
        }),
        json!({
            "taskId": "t1",
            "contextId": "ctx1",
            "kind": "artifact-update",
            "artifact": {"artifactId": "a1", "parts": [{"kind": "text", "text": "x"}]},
            "append": true
        }),
    ] {
        assert_eq!(round_trip::<Event>(event.clone()), event);
    }
}

#[test]
fn unknown_fields_are_dropped_on_output() {
    let task = json!({
        "id": "t1",
        "contextId": "ctx1",
        "kind": "task",
        "status": {"state": "working", "updatedAt": "2026-07-01T10:00:00+00:00"},
        "futureField": true
    });
    let reencoded = round_trip::<Task>(task);
    assert!(reencoded.get("futureField").is_none());
}

//! JSON-RPC 2.0 codec — envelope parsing and response building.
//!
//! The codec is transport-agnostic: it turns a request body into validated
//! [`RpcCall`]s (single or batch, with per-slot failures preserved) and turns
//! handler outcomes back into response envelopes. Notification semantics
//! (absent or null `id` — no response is ever emitted) are enforced here so
//! the HTTP layer only has to route.

use serde_json::Value;

use crate::error::A2AError;
use crate::types::{JsonRpcError, JsonRpcId, JsonRpcResponse};

/// A validated JSON-RPC request envelope.
#[derive(Debug, Clone)]
pub struct RpcCall {
    /// Request identifier. `None` when the request is a notification
    /// (absent or null `id`).
    pub id: Option<JsonRpcId>,

    /// Method name (non-empty).
    pub method: String,

    /// Method parameters (object or array), if present.
    pub params: Option<Value>,
}

impl RpcCall {
    /// Whether this call is a notification — no response may be emitted for
    /// it, even on error.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The id to echo in a response, `Null` for notifications/parse slots.
    pub fn response_id(&self) -> JsonRpcId {
        self.id.clone().unwrap_or(JsonRpcId::Null)
    }
}

/// A parsed request body: a single call or a batch.
///
/// Batch slots keep their individual validation failures so the dispatcher
/// can emit an InvalidRequest response in the corresponding position. The
/// failure carries the element's `id` when that field was itself valid
/// (`Null` otherwise, which [`build_batch`] later drops).
#[derive(Debug)]
pub enum RpcPayload {
    /// A single request object.
    Single(RpcCall),
    /// An array of requests, element-wise validated.
    Batch(Vec<Result<RpcCall, (JsonRpcId, A2AError)>>),
}

/// Parse a request body into validated calls.
///
/// Errors:
/// - malformed JSON -> `ParseError` (-32700, responded to with a null id)
/// - an empty batch array -> `InvalidRequest` (-32600)
/// - a body that is neither object nor array -> `InvalidRequest`
pub fn parse_body(body: &str) -> Result<RpcPayload, A2AError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| A2AError::parse_error(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Err(A2AError::invalid_request("batch must not be empty"));
            }
            Ok(RpcPayload::Batch(
                elements
                    .into_iter()
                    .map(|element| {
                        let salvaged_id = salvage_id(&element);
                        validate_envelope(element).map_err(|e| (salvaged_id, e))
                    })
                    .collect(),
            ))
        }
        Value::Object(_) => Ok(RpcPayload::Single(validate_envelope(value)?)),
        other => Err(A2AError::invalid_request(format!(
            "request must be an object or array, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Validate a single envelope: `jsonrpc == "2.0"`, non-empty string
/// `method`, `id` string|integer|null|absent, `params` object|array|absent.
fn validate_envelope(value: Value) -> Result<RpcCall, A2AError> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(A2AError::invalid_request(format!(
                "request must be an object, got {}",
                json_type_name(&other)
            )))
        }
    };

    match obj.get("jsonrpc").and_then(|v| v.as_str()) {
        Some("2.0") => {}
        _ => return Err(A2AError::invalid_request("jsonrpc must be \"2.0\"")),
    }

    let method = match obj.get("method").and_then(|v| v.as_str()) {
        Some(m) if !m.is_empty() => m.to_string(),
        Some(_) => return Err(A2AError::invalid_request("method must be non-empty")),
        None => return Err(A2AError::invalid_request("method must be a string")),
    };

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(JsonRpcId::String(s.clone())),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(JsonRpcId::Number(i)),
            None => return Err(A2AError::invalid_request("id must be an integer")),
        },
        Some(_) => {
            return Err(A2AError::invalid_request(
                "id must be a string, integer, or null",
            ))
        }
    };

    let params = match obj.get("params") {
        None | Some(Value::Null) => None,
        Some(p @ Value::Object(_)) | Some(p @ Value::Array(_)) => Some(p.clone()),
        Some(_) => {
            return Err(A2AError::invalid_request(
                "params must be an object or array",
            ))
        }
    };

    Ok(RpcCall { id, method, params })
}

/// Best-effort id extraction from an element that failed validation, so
/// its error response can still land in the right slot.
fn salvage_id(value: &Value) -> JsonRpcId {
    match value.get("id") {
        Some(Value::String(s)) => JsonRpcId::String(s.clone()),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(JsonRpcId::Number)
            .unwrap_or(JsonRpcId::Null),
        _ => JsonRpcId::Null,
    }
}

/// Build a response envelope with exactly one of result/error.
pub fn build_response(id: JsonRpcId, outcome: Result<Value, JsonRpcError>) -> JsonRpcResponse {
    match outcome {
        Ok(result) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        },
        Err(error) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        },
    }
}

/// Build an error response for a body that could not be parsed at all.
/// Per JSON-RPC 2.0 the id is null.
pub fn build_parse_failure(err: A2AError) -> JsonRpcResponse {
    build_response(JsonRpcId::Null, Err(err.into()))
}

/// Assemble a batch response, dropping notification slots (null id).
///
/// Returns `None` when every request was a notification — the HTTP layer
/// then responds with no body at all.
pub fn build_batch(responses: Vec<Option<JsonRpcResponse>>) -> Option<Vec<JsonRpcResponse>> {
    let kept: Vec<JsonRpcResponse> = responses
        .into_iter()
        .flatten()
        .filter(|r| r.id != JsonRpcId::Null)
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use serde_json::json;

    #[test]
    fn parses_single_request() {
        let payload =
            parse_body(r#"{"jsonrpc":"2.0","method":"tasks/get","params":{"id":"t1"},"id":1}"#)
                .unwrap();
        match payload {
            RpcPayload::Single(call) => {
                assert_eq!(call.method, "tasks/get");
                assert_eq!(call.id, Some(JsonRpcId::Number(1)));
                assert!(!call.is_notification());
            }
            _ => panic!("expected single"),
        }
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_body("{invalid json").unwrap_err();
        assert_eq!(err.code(), error::PARSE_ERROR);
    }

    #[test]
    fn empty_batch_is_invalid_request() {
        let err = parse_body("[]").unwrap_err();
        assert_eq!(err.code(), error::INVALID_REQUEST);
    }

    #[test]
    fn scalar_body_is_invalid_request() {
        let err = parse_body("42").unwrap_err();
        assert_eq!(err.code(), error::INVALID_REQUEST);
    }

    #[test]
    fn absent_and_null_ids_are_notifications() {
        for body in [
            r#"{"jsonrpc":"2.0","method":"tasks/get"}"#,
            r#"{"jsonrpc":"2.0","method":"tasks/get","id":null}"#,
        ] {
            match parse_body(body).unwrap() {
                RpcPayload::Single(call) => assert!(call.is_notification()),
                _ => panic!("expected single"),
            }
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = parse_body(r#"{"jsonrpc":"1.0","method":"m","id":1}"#).unwrap_err();
        assert_eq!(err.code(), error::INVALID_REQUEST);
    }

    #[test]
    fn empty_method_is_rejected() {
        let err = parse_body(r#"{"jsonrpc":"2.0","method":"","id":1}"#).unwrap_err();
        assert_eq!(err.code(), error::INVALID_REQUEST);
    }

    #[test]
    fn scalar_params_are_rejected() {
        let err = parse_body(r#"{"jsonrpc":"2.0","method":"m","params":5,"id":1}"#).unwrap_err();
        assert_eq!(err.code(), error::INVALID_REQUEST);
    }

    #[test]
    fn batch_preserves_per_slot_failures() {
        let body = json!([
            {"jsonrpc": "2.0", "method": "tasks/get", "params": {"id": "x"}, "id": 1},
            {"jsonrpc": "2.0", "id": 7},
            {"jsonrpc": "2.0", "method": "tasks/get"}
        ])
        .to_string();
        match parse_body(&body).unwrap() {
            RpcPayload::Batch(slots) => {
                assert_eq!(slots.len(), 3);
                assert!(slots[0].is_ok());
                // The invalid element's id is salvaged so its error response
                // can land in the right slot.
                match &slots[1] {
                    Err((id, e)) => {
                        assert_eq!(*id, JsonRpcId::Number(7));
                        assert_eq!(e.code(), error::INVALID_REQUEST);
                    }
                    other => panic!("expected failed slot, got {:?}", other),
                }
                assert!(slots[2].as_ref().unwrap().is_notification());
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn unsalvageable_slot_id_is_null() {
        let body = json!([{"jsonrpc": "2.0", "id": {"nested": true}}]).to_string();
        match parse_body(&body).unwrap() {
            RpcPayload::Batch(slots) => match &slots[0] {
                Err((id, _)) => assert_eq!(*id, JsonRpcId::Null),
                other => panic!("expected failed slot, got {:?}", other),
            },
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn response_has_exactly_one_of_result_or_error() {
        let ok = build_response(JsonRpcId::Number(1), Ok(json!({"x": 1})));
        assert!(ok.result.is_some() && ok.error.is_none());

        let err = build_response(
            JsonRpcId::Number(2),
            Err(JsonRpcError {
                code: error::TASK_NOT_FOUND,
                message: "nope".into(),
                data: None,
            }),
        );
        assert!(err.result.is_none() && err.error.is_some());
    }

    #[test]
    fn parse_failure_response_has_null_id() {
        let response = build_parse_failure(A2AError::parse_error("bad"));
        assert_eq!(response.id, JsonRpcId::Null);
        assert_eq!(response.error.as_ref().unwrap().code, error::PARSE_ERROR);
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["id"].is_null());
    }

    #[test]
    fn batch_drops_notification_responses() {
        let responses = vec![
            Some(build_response(JsonRpcId::Number(1), Ok(json!("a")))),
            None,
            Some(build_response(JsonRpcId::Null, Ok(json!("dropped")))),
        ];
        let batch = build_batch(responses).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, JsonRpcId::Number(1));
    }

    #[test]
    fn all_notification_batch_yields_no_body() {
        assert!(build_batch(vec![None, None]).is_none());
    }
}

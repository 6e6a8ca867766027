//! HTTP entrypoint — axum routes for the A2A server.
//!
//! Three routes (the `/a2a` prefix is the configurable mount point):
//! - `GET /.well-known/a2a/agent-card` — public agent card
//! - `GET /a2a/agent-card/extended` — extended card, 404 unless the public
//!   card advertises `supportsAuthenticatedExtendedCard`
//! - `POST /a2a/rpc` — JSON-RPC endpoint; single requests, batches, and
//!   SSE upgrades for the streaming methods
//!
//! Response rules: JSON-RPC errors are envelopes at HTTP 200; notifications
//! get no body; an all-notification batch gets an empty response. A
//! streaming result switches to `text/event-stream` where every frame is a
//! `data: <json>` line carrying a JSON-RPC success envelope, an error after
//! the first byte becomes a terminal `data: {"error": ...}` frame, and the
//! stream always ends with `data: [DONE]`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, request::Parts, HeaderValue, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::A2AError;
use crate::jsonrpc::{self, RpcCall, RpcPayload};
use crate::types::{
    DeletePushConfigParams, GetPushConfigParams, GetTaskParams, JsonRpcId, JsonRpcResponse,
    SendMessageParams, TaskIdParams, TaskPushNotificationConfig,
};

use super::executor::ServerCallContext;
use super::request_handler::{EventStream, RequestHandler};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Authenticated principal injected into request extensions by host
/// middleware; its presence marks the call context authenticated.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

struct AppState {
    handler: Arc<dyn RequestHandler>,
}

/// Build the A2A router over a request handler. Route paths derive from
/// `config.rpc_mount_prefix`.
pub fn a2a_router(handler: Arc<dyn RequestHandler>, config: &ServerConfig) -> Router {
    let prefix = config.rpc_mount_prefix.trim_end_matches('/');
    let state = Arc::new(AppState { handler });
    Router::new()
        .route("/.well-known/a2a/agent-card", get(handle_agent_card))
        .route(
            &format!("{}/agent-card/extended", prefix),
            get(handle_extended_card),
        )
        .route(&format!("{}/rpc", prefix), post(handle_rpc))
        .with_state(state)
}

/// Pull transport context (peer address, user agent, headers, principal)
/// out of the request for the handler layer.
fn extract_call_context(parts: &Parts) -> ServerCallContext {
    let mut headers = std::collections::HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    ServerCallContext {
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.to_string()),
        user_agent: headers.get("user-agent").cloned(),
        principal: parts.extensions.get::<Principal>().map(|p| p.0.clone()),
        headers,
    }
}

async fn handle_agent_card(State(state): State<Arc<AppState>>) -> Response {
    match state.handler.on_get_card().await {
        Ok(card) => Json(card).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to produce agent card");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_extended_card(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let supports = match state.handler.on_get_card().await {
        Ok(card) => card.supports_authenticated_extended_card.unwrap_or(false),
        Err(_) => false,
    };
    if !supports {
        return StatusCode::NOT_FOUND.into_response();
    }

    let call = extract_call_context(&parts);
    match state.handler.on_get_extended_card(call).await {
        Ok(card) => Json(card).into_response(),
        Err(e @ A2AError::AuthRequired { .. }) => {
            let error: crate::types::JsonRpcError = e.into();
            (StatusCode::UNAUTHORIZED, Json(error)).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_rpc(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let json_content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    if !json_content_type {
        return envelope_response(jsonrpc::build_response(
            JsonRpcId::Null,
            Err(A2AError::invalid_request("Content-Type must include application/json").into()),
        ));
    }

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return envelope_response(jsonrpc::build_response(
                JsonRpcId::Null,
                Err(A2AError::invalid_request(format!("unreadable body: {}", e)).into()),
            ));
        }
    };
    let body_text = String::from_utf8_lossy(&bytes);
    let call_context = extract_call_context(&parts);

    let payload = match jsonrpc::parse_body(&body_text) {
        Ok(payload) => payload,
        Err(e) => return envelope_response(jsonrpc::build_parse_failure(e)),
    };

    match payload {
        RpcPayload::Single(call) => {
            debug!(method = %call.method, "JSON-RPC request");
            if is_streaming_method(&call.method) {
                return handle_streaming_call(&state, call, call_context).await;
            }
            match dispatch_unary(&state, call, &call_context).await {
                Some(response) => envelope_response(response),
                None => StatusCode::NO_CONTENT.into_response(),
            }
        }
        RpcPayload::Batch(slots) => {
            let mut responses = Vec::with_capacity(slots.len());
            for slot in slots {
                let response = match slot {
                    Err((id, e)) => Some(jsonrpc::build_response(id, Err(e.into()))),
                    Ok(call) if is_streaming_method(&call.method) => {
                        // Streaming requires a single-request body.
                        let err = A2AError::invalid_request(format!(
                            "{} cannot be used inside a batch",
                            call.method
                        ));
                        call.id
                            .clone()
                            .map(|id| jsonrpc::build_response(id, Err(err.into())))
                    }
                    Ok(call) => dispatch_unary(&state, call, &call_context).await,
                };
                responses.push(response);
            }
            match jsonrpc::build_batch(responses) {
                Some(batch) => Json(batch).into_response(),
                None => StatusCode::NO_CONTENT.into_response(),
            }
        }
    }
}

fn is_streaming_method(method: &str) -> bool {
    matches!(method, "message/stream" | "tasks/resubscribe")
}

/// Route one non-streaming call. Returns `None` for notifications — they
/// never produce a response, even on error.
async fn dispatch_unary(
    state: &AppState,
    call: RpcCall,
    call_context: &ServerCallContext,
) -> Option<JsonRpcResponse> {
    let id = call.id.clone();
    let outcome = route_method(state, call, call_context).await;
    if let Err(ref e) = outcome {
        debug!(code = e.code(), error = %e, "Method returned an error");
    }
    id.map(|id| jsonrpc::build_response(id, outcome.map_err(Into::into)))
}

async fn route_method(
    state: &AppState,
    call: RpcCall,
    call_context: &ServerCallContext,
) -> Result<Value, A2AError> {
    let handler = &state.handler;
    match call.method.as_str() {
        "message/send" => {
            let params: SendMessageParams = parse_params(call.params)?;
            let result = handler
                .on_message_send(params, call_context.clone())
                .await?;
            to_result_value(&result)
        }
        "tasks/get" => {
            let params: GetTaskParams = parse_params(call.params)?;
            to_result_value(&handler.on_get_task(params).await?)
        }
        "tasks/cancel" => {
            let params: TaskIdParams = parse_params(call.params)?;
            to_result_value(&handler.on_cancel_task(params).await?)
        }
        "tasks/pushNotificationConfig/set" => {
            let params: TaskPushNotificationConfig = parse_params(call.params)?;
            to_result_value(&handler.on_set_push_config(params).await?)
        }
        "tasks/pushNotificationConfig/get" => {
            let params: GetPushConfigParams = parse_params(call.params)?;
            to_result_value(&handler.on_get_push_config(params).await?)
        }
        "tasks/pushNotificationConfig/list" => {
            let params: TaskIdParams = parse_params(call.params)?;
            to_result_value(&handler.on_list_push_configs(params).await?)
        }
        "tasks/pushNotificationConfig/delete" => {
            let params: DeletePushConfigParams = parse_params(call.params)?;
            handler.on_delete_push_config(params).await?;
            Ok(Value::Bool(true))
        }
        "agent/getCard" => to_result_value(&handler.on_get_card().await?),
        "agent/getAuthenticatedExtendedCard" => {
            to_result_value(&handler.on_get_extended_card(call_context.clone()).await?)
        }
        // Streaming methods land here only from inside a batch; the single
        // path diverts to SSE before dispatch.
        "message/stream" | "tasks/resubscribe" => Err(A2AError::invalid_request(
            "streaming methods require a single-request body",
        )),
        other => Err(A2AError::method_not_found(other)),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, A2AError> {
    let value = params.ok_or_else(|| A2AError::invalid_params("missing params"))?;
    serde_json::from_value(value).map_err(|e| A2AError::invalid_params(e.to_string()))
}

fn to_result_value<T: serde::Serialize>(value: &T) -> Result<Value, A2AError> {
    serde_json::to_value(value).map_err(|e| A2AError::internal(e.to_string()))
}

async fn handle_streaming_call(
    state: &Arc<AppState>,
    call: RpcCall,
    call_context: ServerCallContext,
) -> Response {
    // A streaming notification has nowhere to stream to; per the
    // notification rule it gets no response at all.
    let Some(id) = call.id.clone() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let outcome = match call.method.as_str() {
        "message/stream" => match parse_params::<SendMessageParams>(call.params) {
            Ok(params) => state.handler.on_message_stream(params, call_context).await,
            Err(e) => Err(e),
        },
        "tasks/resubscribe" => match parse_params::<TaskIdParams>(call.params) {
            Ok(params) => state.handler.on_resubscribe(params).await,
            Err(e) => Err(e),
        },
        other => Err(A2AError::method_not_found(other)),
    };

    match outcome {
        Ok(stream) => sse_response(id, stream),
        Err(e) => envelope_response(jsonrpc::build_response(id, Err(e.into()))),
    }
}

fn envelope_response(response: JsonRpcResponse) -> Response {
    // JSON-RPC errors are HTTP 200 by design.
    Json(response).into_response()
}

fn sse_response(id: JsonRpcId, stream: EventStream) -> Response {
    let mut response = Sse::new(sse_frames(id, stream))
        .keep_alive(KeepAlive::default())
        .into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Frame a handler event stream as SSE: one JSON-RPC success envelope per
/// event, a terminal `{"error": ...}` frame if anything fails mid-stream,
/// and a closing `[DONE]`.
fn sse_frames(
    id: JsonRpcId,
    mut stream: EventStream,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    async_stream::stream! {
        while let Some(event) = stream.next_event().await {
            let is_final = event.is_final();
            match serde_json::to_value(&event)
                .map(|value| jsonrpc::build_response(id.clone(), Ok(value)))
                .and_then(|envelope| serde_json::to_string(&envelope))
            {
                Ok(json) => yield Ok(SseEvent::default().data(json)),
                Err(e) => {
                    // Status can't change mid-stream; surface the failure as
                    // a terminal error frame instead.
                    warn!(error = %e, "Failed to frame SSE event");
                    let error: crate::types::JsonRpcError =
                        A2AError::internal(e.to_string()).into();
                    let frame = serde_json::json!({ "error": error }).to_string();
                    yield Ok(SseEvent::default().data(frame));
                    break;
                }
            }
            if is_final {
                break;
            }
        }
        yield Ok(SseEvent::default().data("[DONE]"));
    }
}

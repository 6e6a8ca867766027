//! Shared fixtures for the integration suites: test agents, a server
//! launcher bound to an ephemeral port, and JSON-RPC request helpers.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use a2a_server::builders::AgentCardBuilder;
use a2a_server::config::ServerConfig;
use a2a_server::error::A2AResult;
use a2a_server::server::{
    a2a_router, AgentExecutor, DefaultRequestHandler, EventQueue, InMemoryTaskStore,
    RequestContext, TaskStore, TaskUpdater,
};
use a2a_server::types::AgentCard;

/// Install a single process-wide tracing subscriber so server-side warnings
/// show up in failing test output. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .try_init();
    });
}

/// Completes immediately: working, then completed with `{"echo": <text>}`.
pub struct EchoAgent;

#[async_trait]
impl AgentExecutor for EchoAgent {
    async fn execute(&self, ctx: RequestContext, queue: EventQueue) -> A2AResult<()> {
        let updater = TaskUpdater::new(queue, ctx.task_id.clone(), ctx.context_id.clone());
        updater.start_work(None).await?;
        let echo = json!({ "echo": ctx.user_input(" ") });
        updater.complete(Some(echo)).await?;
        Ok(())
    }

    async fn cancel(&self, ctx: RequestContext, queue: EventQueue) -> A2AResult<()> {
        let updater = TaskUpdater::new(queue, ctx.task_id, ctx.context_id);
        updater.cancel().await
    }
}

/// Starts working and then waits for cooperative cancellation (or a 10 s
/// safety valve, after which it completes).
pub struct SlowAgent;

#[async_trait]
impl AgentExecutor for SlowAgent {
    async fn execute(&self, ctx: RequestContext, queue: EventQueue) -> A2AResult<()> {
        let updater = TaskUpdater::new(queue, ctx.task_id.clone(), ctx.context_id.clone());
        updater.start_work(None).await?;
        for _ in 0..1000 {
            if ctx.is_canceled() {
                // The cancel() entrypoint publishes the canceled status.
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        updater.complete(None).await?;
        Ok(())
    }

    async fn cancel(&self, ctx: RequestContext, queue: EventQueue) -> A2AResult<()> {
        let updater = TaskUpdater::new(queue, ctx.task_id, ctx.context_id);
        updater.cancel().await
    }
}

/// Fails straight away; the handler publishes the failed status.
pub struct FailingAgent;

#[async_trait]
impl AgentExecutor for FailingAgent {
    async fn execute(&self, _ctx: RequestContext, _queue: EventQueue) -> A2AResult<()> {
        Err(a2a_server::A2AError::internal("Agent crashed"))
    }

    async fn cancel(&self, _ctx: RequestContext, _queue: EventQueue) -> A2AResult<()> {
        Ok(())
    }
}

/// Default card for a test server. Each suite should pass a distinct agent
/// name: the capability registry is process-wide per agent class.
pub fn test_card(name: &str) -> AgentCard {
    AgentCardBuilder::new(name, "Agent under test", "0.1.0")
        .url("http://localhost/a2a")
        .with_streaming(true)
        .with_push_notifications(true)
        .with_skill("echo", "Echo", "Echoes the input", vec!["test".to_string()])
        .build()
}

/// Spin up a real server on an ephemeral port. Returns the base URL and the
/// serve-task handle.
pub async fn start_test_server(
    executor: Arc<dyn AgentExecutor>,
    card: AgentCard,
    config: ServerConfig,
) -> (String, tokio::task::JoinHandle<()>) {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    start_test_server_with_store(executor, card, config, store).await
}

/// Same as [`start_test_server`] with a caller-supplied store.
pub async fn start_test_server_with_store(
    executor: Arc<dyn AgentExecutor>,
    card: AgentCard,
    config: ServerConfig,
    store: Arc<dyn TaskStore>,
) -> (String, tokio::task::JoinHandle<()>) {
    init_tracing();
    let handler = Arc::new(DefaultRequestHandler::new(
        executor,
        store,
        card,
        config.clone(),
    ));
    let app = a2a_router(handler, &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}", addr), handle)
}

/// Build a `message/send` request body.
pub fn message_send_request(id: i64, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "message/send",
        "params": {
            "message": {
                "messageId": format!("m-{}", id),
                "role": "user",
                "kind": "message",
                "parts": [{"kind": "text", "text": text}]
            }
        },
        "id": id
    })
}

/// POST a JSON-RPC body and decode the JSON response.
pub async fn rpc(client: &reqwest::Client, base_url: &str, body: &Value) -> Value {
    client
        .post(format!("{}/a2a/rpc", base_url))
        .json(body)
        .send()
        .await
        .expect("rpc request")
        .json()
        .await
        .expect("rpc response body")
}

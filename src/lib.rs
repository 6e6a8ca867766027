//! # a2a-server — server side of the Agent-to-Agent (A2A) protocol
//!
//! A JSON-RPC 2.0 endpoint over HTTP that lets remote clients submit
//! messages to an agent, track long-running tasks, stream incremental
//! results over SSE, and receive out-of-band webhook notifications.
//!
//! ## Architecture
//!
//! ```text
//! HTTP request
//!   -> http (routes, batch dispatch, SSE framing)
//!   -> jsonrpc (envelope codec)
//!   -> request_handler (method semantics)
//!       -> event_queue  (per-request bounded channel)
//!       -> executor     (your agent, on its own worker)
//!       -> task_manager (state machine + store application)
//!           -> task_store           (persistence)
//!           -> push_notifications   (webhooks with retry + SSE fan-out)
//! ```
//!
//! The executor publishes [`types::Event`]s to the queue; the request
//! handler either collects them into a synchronous response
//! (`message/send`) or streams them as SSE frames (`message/stream`,
//! `tasks/resubscribe`) until the task reaches a terminal state.
//!
//! ## Implementing an agent
//!
//! ```rust,ignore
//! use a2a_server::server::{AgentExecutor, EventQueue, RequestContext, TaskUpdater};
//! use a2a_server::error::A2AResult;
//! use async_trait::async_trait;
//!
//! struct EchoAgent;
//!
//! #[async_trait]
//! impl AgentExecutor for EchoAgent {
//!     async fn execute(&self, ctx: RequestContext, queue: EventQueue) -> A2AResult<()> {
//!         let updater = TaskUpdater::new(queue, ctx.task_id.clone(), ctx.context_id.clone());
//!         updater.start_work(None).await?;
//!         let echo = serde_json::json!({ "echo": ctx.user_input(" ") });
//!         updater.complete(Some(echo)).await?;
//!         Ok(())
//!     }
//!
//!     async fn cancel(&self, ctx: RequestContext, queue: EventQueue) -> A2AResult<()> {
//!         let updater = TaskUpdater::new(queue, ctx.task_id.clone(), ctx.context_id.clone());
//!         updater.cancel().await
//!     }
//! }
//! ```
//!
//! Serve it with [`server::a2a_router`]:
//!
//! ```rust,ignore
//! let config = ServerConfig::from_env();
//! let card = AgentCardBuilder::new("Echo Agent", "Echoes messages", "1.0.0")
//!     .url("http://localhost:7420/a2a")
//!     .with_streaming(true)
//!     .build();
//! let handler = Arc::new(DefaultRequestHandler::new(executor, store, card, config.clone()));
//! let app = a2a_router(handler, &config);
//! axum::serve(listener, app).await?;
//! ```
//!
//! ## Supported JSON-RPC methods
//!
//! `message/send`, `message/stream`, `tasks/get`, `tasks/cancel`,
//! `tasks/resubscribe`, `tasks/pushNotificationConfig/{set,get,list,delete}`,
//! `agent/getCard`, `agent/getAuthenticatedExtendedCard`.

pub mod builders;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod server;
pub mod types;
pub mod utils;

/// Commonly used types and traits.
pub mod prelude {
    pub use crate::builders::AgentCardBuilder;
    pub use crate::config::ServerConfig;
    pub use crate::error::{A2AError, A2AResult};
    pub use crate::server::{
        a2a_router, AgentExecutor, DefaultRequestHandler, EventConsumer, EventFilter, EventQueue,
        InMemoryTaskStore, PushNotificationManager, RequestContext, RequestHandler,
        ServerCallContext, TaskManager, TaskStore, TaskUpdater,
    };
    pub use crate::types::{
        AgentCapabilities, AgentCard, AgentSkill, Artifact, Event, Message, Part,
        PushNotificationConfig, Role, Task, TaskPushNotificationConfig, TaskState, TaskStatus,
    };
}

pub use builders::AgentCardBuilder;
pub use config::ServerConfig;
pub use error::{A2AError, A2AResult};

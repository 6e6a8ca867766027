//! A2A server framework — the protocol + concurrency engine.
//!
//! - [`AgentExecutor`] trait — implement your agent logic
//! - [`RequestContext`] / [`ServerCallContext`] — execution context with
//!   identifiers, cancellation, and transport details
//! - [`TaskStore`] trait + [`InMemoryTaskStore`] — persistence
//! - [`EventQueue`] / [`EventConsumer`] — bounded per-request event channel
//! - [`TaskManager`] — event application + lifecycle state machine
//! - [`PushNotificationManager`] — webhook delivery + SSE client registry
//! - [`TaskUpdater`] — ergonomic event publisher for executors
//! - [`CapabilityRegistry`] — process-wide capability flags with listeners
//! - [`RequestHandler`] trait + [`DefaultRequestHandler`] — method semantics
//! - [`a2a_router`] — ready-made axum routes
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use a2a_server::config::ServerConfig;
//! use a2a_server::server::*;
//!
//! let executor: Arc<dyn AgentExecutor> = Arc::new(MyAgent);
//! let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//! let config = ServerConfig::from_env();
//! let handler = Arc::new(DefaultRequestHandler::new(executor, store, card, config.clone()));
//! let app = a2a_router(handler, &config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7420").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod capabilities;
pub mod event_queue;
pub mod executor;
pub mod http;
pub mod push_notifications;
pub mod request_handler;
pub mod task_manager;
pub mod task_store;
pub mod task_updater;

pub use capabilities::{
    CapabilityChange, CapabilityRegistry, ListenerId, CAP_PUSH_NOTIFICATIONS, CAP_STREAMING,
};
pub use event_queue::{EventConsumer, EventFilter, EventQueue};
pub use executor::{AgentExecutor, RequestContext, ServerCallContext};
pub use http::{a2a_router, Principal};
pub use push_notifications::{
    DeliveryState, PushNotificationManager, SseClientRegistry, SseFrame, WebhookPayload,
};
pub use request_handler::{DefaultRequestHandler, EventStream, RequestHandler};
pub use task_manager::{transition_allowed, TaskManager};
pub use task_store::{ArtifactMode, InMemoryTaskStore, TaskStore};
pub use task_updater::TaskUpdater;

//! Agent executor trait — the integration point for agent logic.
//!
//! Implementors read the triggering message and target identifiers from a
//! [`RequestContext`] and publish events to the request's [`EventQueue`].
//! The executor is oblivious to whether its output is consumed synchronously
//! or streamed; it only writes to the queue.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::A2AResult;
use crate::types::{Message, Task};

use super::event_queue::EventQueue;

/// Transport-level context captured by the HTTP entrypoint for one call:
/// peer identity, headers, and the authenticated principal supplied by host
/// middleware.
#[derive(Debug, Clone, Default)]
pub struct ServerCallContext {
    /// Remote peer address, when the transport exposes one.
    pub remote_addr: Option<String>,

    /// The caller's User-Agent header.
    pub user_agent: Option<String>,

    /// All request headers, lower-cased names.
    pub headers: HashMap<String, String>,

    /// Authenticated principal provided by the host framework.
    pub principal: Option<String>,
}

impl ServerCallContext {
    /// Whether the call carries an authenticated principal.
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

/// Context for one agent execution.
///
/// Carries the target identifiers, the triggering message (absent for
/// cancel requests), the current task snapshot, and the cooperative
/// cancellation signal executors are expected to poll.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier of the task being executed.
    pub task_id: String,

    /// Conversation context identifier.
    pub context_id: String,

    /// The incoming message that triggered this execution. `None` for
    /// cancel requests.
    pub message: Option<Message>,

    /// Snapshot of the task at dispatch time.
    pub task: Option<Task>,

    /// Arbitrary metadata from the client request.
    pub metadata: Option<serde_json::Value>,

    /// Cooperative cancellation signal. `tasks/cancel` triggers it; a
    /// well-behaved executor checks [`is_canceled`](Self::is_canceled) at
    /// its own suspension points and terminates promptly.
    pub cancellation: CancellationToken,

    /// Transport-level call context.
    pub call: ServerCallContext,
}

impl RequestContext {
    /// Whether cancellation has been requested for this task.
    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// All text content of the triggering message, joined by `delimiter`.
    /// Empty when there is no message or no text parts.
    pub fn user_input(&self, delimiter: &str) -> String {
        let Some(ref message) = self.message else {
            return String::new();
        };
        crate::utils::get_text_parts(&message.parts).join(delimiter)
    }
}

/// Core trait for agent execution logic.
///
/// `execute` must publish at least one terminal status update (completed or
/// failed) for its task, or return an error — the spawner translates an
/// error into a `failed` status event carrying the error's message.
///
/// `cancel` publishes a `canceled` status update for the task named by the
/// context; it may be a no-op when the task is not active.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute the agent's logic, publishing events to `event_queue`.
    async fn execute(&self, context: RequestContext, event_queue: EventQueue) -> A2AResult<()>;

    /// Request cancellation of the task identified by `context`.
    async fn cancel(&self, context: RequestContext, event_queue: EventQueue) -> A2AResult<()>;
}

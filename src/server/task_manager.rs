//! Task manager — applies event streams to the store and enforces the
//! lifecycle state machine.
//!
//! The manager subscribes to the event queue of every in-flight request
//! ([`TaskManager::attach`]) and is the only component that mutates task
//! state from events:
//!
//! - `task` events insert or replace the task;
//! - `status-update` events run through the transition graph, then
//!   `update_task_status`;
//! - `artifact-update` events map their `append` flag onto the store's
//!   artifact mode;
//! - `message` events append to the history of the task they name.
//!
//! A publication that attempts an illegal transition is dropped and logged,
//! and a counter increments. Every applied status and artifact event is
//! forwarded to the push-notification manager for webhook + SSE delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::types::{Event, Message, Task, TaskState};

use super::event_queue::EventQueue;
use super::push_notifications::PushNotificationManager;
use super::task_store::{ArtifactMode, TaskStore};

/// Whether the lifecycle graph permits `from -> to`.
///
/// Re-asserting the same terminal state is not a transition; the store
/// treats it as an idempotent no-op, so it is allowed through here.
pub fn transition_allowed(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    match from {
        Submitted => matches!(
            to,
            Working | Canceled | Failed | Rejected | AuthRequired | InputRequired
        ),
        // Repeated `working` carries progress updates.
        Working => matches!(
            to,
            Working | InputRequired | Completed | Canceled | Failed | AuthRequired
        ),
        InputRequired => matches!(to, Working | Canceled | Failed),
        AuthRequired => matches!(to, Working | Canceled | Failed),
        Completed | Canceled | Failed | Rejected => to == from,
        Unknown => false,
    }
}

/// Authoritative projection of task state from event streams.
#[derive(Clone)]
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    push: PushNotificationManager,
    rejected_events: Arc<AtomicU64>,
}

impl TaskManager {
    /// Create a manager over the given store and push fan-out.
    pub fn new(store: Arc<dyn TaskStore>, push: PushNotificationManager) -> Self {
        Self {
            store,
            push,
            rejected_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of event publications dropped for violating the transition
    /// graph.
    pub fn rejected_events(&self) -> u64 {
        self.rejected_events.load(Ordering::Relaxed)
    }

    /// Allocate identifiers for a new request: the given ids when present,
    /// fresh UUID v4 values otherwise.
    pub fn resolve_ids(task_id: Option<String>, context_id: Option<String>) -> (String, String) {
        (
            task_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            context_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        )
    }

    /// Create and persist a new task in `submitted` state, seeded with the
    /// triggering message.
    pub async fn create_task(
        &self,
        task_id: String,
        context_id: String,
        message: &Message,
        metadata: Option<serde_json::Value>,
    ) -> A2AResult<Task> {
        let mut task = Task::submitted(task_id, context_id);
        task.history = Some(vec![message.clone()]);
        task.metadata = metadata;
        self.store.save_task(task.clone()).await?;
        debug!(task_id = %task.id, context_id = %task.context_id, "Task created");
        Ok(task)
    }

    /// Subscribe this manager to a request's event queue, then apply every
    /// event on a background worker until the queue closes or a final event
    /// is observed. The subscription is taken before returning, so no event
    /// published after `attach` can be missed.
    pub async fn attach(&self, queue: &EventQueue) {
        let mut consumer = queue.subscribe_all().await;
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = consumer.next_event().await {
                let is_final = event.is_final();
                if let Err(e) = manager.apply(&event).await {
                    warn!(error = %e, "Failed to apply event to store");
                }
                if is_final {
                    break;
                }
            }
        });
    }

    /// Apply one event to the store, forwarding applied status/artifact
    /// events to the push-notification manager. Returns whether the event
    /// was applied (an illegal transition is dropped, not an error).
    pub async fn apply(&self, event: &Event) -> A2AResult<bool> {
        match event {
            Event::Task(task) => {
                self.store.save_task(task.clone()).await?;
                Ok(true)
            }
            Event::StatusUpdate(update) => {
                let current = match self.store.get_task(&update.task_id, None).await? {
                    Some(task) => task,
                    None => {
                        // Event for an unknown task: materialize it first so
                        // the update has something to apply to.
                        let task =
                            Task::submitted(update.task_id.clone(), update.context_id.clone());
                        self.store.save_task(task.clone()).await?;
                        task
                    }
                };

                let from = current.status.state;
                let to = update.status.state;
                if !transition_allowed(from, to) {
                    self.reject(&update.task_id, from, to);
                    return Ok(false);
                }

                // Preserve the outgoing status message in history before the
                // new status replaces it; message-less progress ticks leave
                // history untouched.
                if let Some(ref outgoing) = current.status.message {
                    self.store
                        .append_message(&update.task_id, outgoing.clone())
                        .await?;
                }

                match self
                    .store
                    .update_task_status(&update.task_id, update.status.clone())
                    .await
                {
                    Ok(_) => {
                        self.push.notify(event).await;
                        Ok(true)
                    }
                    Err(A2AError::InvalidTaskState { .. }) => {
                        // Lost a race with a concurrent terminal transition.
                        self.reject(&update.task_id, from, to);
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            Event::ArtifactUpdate(update) => {
                if self.store.get_task(&update.task_id, None).await?.is_none() {
                    let task = Task::submitted(update.task_id.clone(), update.context_id.clone());
                    self.store.save_task(task).await?;
                }
                let mode = if update.append.unwrap_or(false) {
                    ArtifactMode::AppendParts
                } else {
                    ArtifactMode::Replace
                };
                self.store
                    .append_artifact(&update.task_id, update.artifact.clone(), mode)
                    .await?;
                self.push.notify(event).await;
                Ok(true)
            }
            Event::Message(message) => {
                if let Some(ref task_id) = message.task_id {
                    self.store.append_message(task_id, message.clone()).await?;
                } else {
                    debug!("Message event without task id, nothing to append to");
                }
                Ok(true)
            }
        }
    }

    fn reject(&self, task_id: &str, from: TaskState, to: TaskState) {
        self.rejected_events.fetch_add(1, Ordering::Relaxed);
        warn!(
            task_id = %task_id,
            from = %from,
            to = %to,
            "Dropping event with illegal state transition"
        );
    }
}

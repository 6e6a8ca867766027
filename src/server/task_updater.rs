//! Task updater — helper for publishing task state transitions.
//!
//! Wraps an [`EventQueue`] with ergonomic methods for the transitions an
//! executor performs. Tracks whether the task has reached a terminal state
//! and rejects further status updates after that point; the authoritative
//! state machine still runs in the task manager, this is the first line of
//! defense inside the executor.

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::types::{
    Artifact, Event, Message, Part, Role, StatusError, TaskArtifactUpdateEvent, TaskState,
    TaskStatus, TaskStatusUpdateEvent,
};

use super::event_queue::EventQueue;

/// Publishes status and artifact events for one task.
///
/// Safe to share across workers via `Arc<TaskUpdater>`.
pub struct TaskUpdater {
    event_queue: EventQueue,
    task_id: String,
    context_id: String,
    terminal_reached: Mutex<bool>,
}

impl TaskUpdater {
    /// Create an updater for the given task and context.
    pub fn new(event_queue: EventQueue, task_id: String, context_id: String) -> Self {
        Self {
            event_queue,
            task_id,
            context_id,
            terminal_reached: Mutex::new(false),
        }
    }

    /// Publish a status update.
    ///
    /// Terminal states force `final = true`. Returns an error once a
    /// terminal state has already been published through this updater.
    pub async fn update_status(&self, status: TaskStatus, r#final: bool) -> A2AResult<()> {
        let is_terminal = status.state.is_terminal();
        {
            let mut reached = self.terminal_reached.lock().await;
            if *reached {
                warn!(
                    task_id = %self.task_id,
                    requested_state = %status.state,
                    "Status update after terminal state"
                );
                return Err(A2AError::invalid_task_state(format!(
                    "task {} already reached a terminal state",
                    self.task_id
                )));
            }
            if is_terminal {
                *reached = true;
            }
        }

        let state = status.state;
        let event = Event::StatusUpdate(TaskStatusUpdateEvent {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            kind: "status-update".to_string(),
            status,
            r#final: is_terminal || r#final,
            metadata: None,
        });
        self.event_queue.publish(event).await?;
        debug!(task_id = %self.task_id, state = %state, "Status update published");
        Ok(())
    }

    /// Publish the initial `submitted` status.
    pub async fn submit(&self) -> A2AResult<()> {
        self.update_status(self.status(TaskState::Submitted), false)
            .await
    }

    /// Transition to `working`, optionally reporting progress.
    pub async fn start_work(&self, progress: Option<f64>) -> A2AResult<()> {
        let mut status = self.status(TaskState::Working);
        status.progress = progress;
        self.update_status(status, false).await
    }

    /// Transition to `working` with a text status message.
    pub async fn working_with_text(&self, text: &str) -> A2AResult<()> {
        let status = self
            .status(TaskState::Working)
            .with_message(self.agent_message(vec![Part::text(text)]));
        self.update_status(status, false).await
    }

    /// Terminal `completed`, optionally carrying a result payload.
    pub async fn complete(&self, result: Option<serde_json::Value>) -> A2AResult<()> {
        let mut status = self.status(TaskState::Completed);
        status.result = result;
        self.update_status(status, true).await
    }

    /// Terminal `completed` with a text status message.
    pub async fn complete_with_text(&self, text: &str) -> A2AResult<()> {
        let status = self
            .status(TaskState::Completed)
            .with_message(self.agent_message(vec![Part::text(text)]));
        self.update_status(status, true).await
    }

    /// Terminal `failed` with structured error details.
    pub async fn fail(&self, kind: &str, message: &str) -> A2AResult<()> {
        let status = self.status(TaskState::Failed).with_error(StatusError {
            kind: kind.to_string(),
            message: message.to_string(),
            details: None,
        });
        self.update_status(status, true).await
    }

    /// Terminal `canceled`.
    pub async fn cancel(&self) -> A2AResult<()> {
        self.update_status(self.status(TaskState::Canceled), true)
            .await
    }

    /// Terminal `rejected`.
    pub async fn reject(&self) -> A2AResult<()> {
        self.update_status(self.status(TaskState::Rejected), true)
            .await
    }

    /// Transition to `input-required`.
    pub async fn requires_input(&self, message: Option<Message>) -> A2AResult<()> {
        let mut status = self.status(TaskState::InputRequired);
        status.message = message;
        self.update_status(status, false).await
    }

    /// Transition to `auth-required`.
    pub async fn requires_auth(&self) -> A2AResult<()> {
        self.update_status(self.status(TaskState::AuthRequired), false)
            .await
    }

    /// Publish an artifact update. An artifact id is generated when absent.
    pub async fn add_artifact(
        &self,
        parts: Vec<Part>,
        artifact_id: Option<String>,
        name: Option<String>,
        append: Option<bool>,
        last_chunk: Option<bool>,
    ) -> A2AResult<()> {
        let artifact_id = artifact_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let event = Event::ArtifactUpdate(TaskArtifactUpdateEvent {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            kind: "artifact-update".to_string(),
            artifact: Artifact {
                artifact_id: artifact_id.clone(),
                name,
                description: None,
                parts,
                metadata: None,
                extensions: None,
            },
            append,
            last_chunk,
            metadata: None,
        });
        self.event_queue.publish(event).await?;
        debug!(task_id = %self.task_id, artifact_id = %artifact_id, "Artifact update published");
        Ok(())
    }

    /// Whether a terminal state has been published through this updater.
    pub async fn is_terminal(&self) -> bool {
        *self.terminal_reached.lock().await
    }

    /// The task this updater publishes for.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// The context this updater publishes for.
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    fn status(&self, state: TaskState) -> TaskStatus {
        TaskStatus {
            state,
            message: None,
            progress: None,
            result: None,
            error: None,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    fn agent_message(&self, parts: Vec<Part>) -> Message {
        Message {
            message_id: Uuid::new_v4().to_string(),
            role: Role::Agent,
            kind: "message".to_string(),
            parts,
            context_id: Some(self.context_id.clone()),
            task_id: Some(self.task_id.clone()),
            metadata: None,
            extensions: None,
            reference_task_ids: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updater_and_queue() -> (TaskUpdater, EventQueue) {
        let queue = EventQueue::with_default_capacity();
        let updater = TaskUpdater::new(queue.clone(), "t1".to_string(), "ctx1".to_string());
        (updater, queue)
    }

    #[tokio::test]
    async fn complete_publishes_final_status_with_result() {
        let (updater, queue) = updater_and_queue();
        let mut consumer = queue.subscribe_all().await;

        updater
            .complete(Some(serde_json::json!({"echo": "hi"})))
            .await
            .unwrap();

        match consumer.next_event().await.unwrap() {
            Event::StatusUpdate(update) => {
                assert_eq!(update.status.state, TaskState::Completed);
                assert!(update.r#final);
                assert_eq!(update.status.result.unwrap()["echo"], "hi");
            }
            other => panic!("expected status update, got {:?}", other),
        }
        assert!(updater.is_terminal().await);
    }

    #[tokio::test]
    async fn updates_after_terminal_are_rejected() {
        let (updater, _queue) = updater_and_queue();
        updater.complete(None).await.unwrap();
        let err = updater.start_work(None).await.unwrap_err();
        assert_eq!(err.code(), crate::error::INVALID_TASK_STATE);
    }

    #[tokio::test]
    async fn fail_carries_structured_error() {
        let (updater, queue) = updater_and_queue();
        let mut consumer = queue.subscribe_all().await;
        updater.fail("agent_error", "boom").await.unwrap();

        match consumer.next_event().await.unwrap() {
            Event::StatusUpdate(update) => {
                assert_eq!(update.status.state, TaskState::Failed);
                let error = update.status.error.unwrap();
                assert_eq!(error.kind, "agent_error");
                assert_eq!(error.message, "boom");
            }
            other => panic!("expected status update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn add_artifact_generates_id_when_absent() {
        let (updater, queue) = updater_and_queue();
        let mut consumer = queue.subscribe_all().await;
        updater
            .add_artifact(vec![Part::text("chunk")], None, None, None, Some(true))
            .await
            .unwrap();

        match consumer.next_event().await.unwrap() {
            Event::ArtifactUpdate(update) => {
                assert!(Uuid::parse_str(&update.artifact.artifact_id).is_ok());
                assert_eq!(update.last_chunk, Some(true));
            }
            other => panic!("expected artifact update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn working_progress_is_forwarded() {
        let (updater, queue) = updater_and_queue();
        let mut consumer = queue.subscribe_all().await;
        updater.start_work(Some(0.25)).await.unwrap();
        match consumer.next_event().await.unwrap() {
            Event::StatusUpdate(update) => assert_eq!(update.status.progress, Some(0.25)),
            other => panic!("expected status update, got {:?}", other),
        }
    }
}

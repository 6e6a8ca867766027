//! Task store — persistence layer for tasks, history, artifacts, and push
//! notification configs.
//!
//! The store owns all persisted state. [`InMemoryTaskStore`] is the
//! reference implementation: one `tokio::sync::Mutex` around the task map,
//! so every mutation of a given task id is linearizable. Richer backends
//! implementing [`TaskStore`] must provide equivalent per-task isolation.
//!
//! Lifecycle rules enforced here (the full transition graph lives in the
//! task manager):
//! - a status update departing a terminal state is rejected, except
//!   re-asserting the *same* terminal state, which is an idempotent no-op
//!   keeping the first application's `updated_at`;
//! - `status.updated_at` never decreases.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::types::{
    Artifact, Message, PushNotificationConfig, Task, TaskPushNotificationConfig, TaskStatus,
};

/// How [`TaskStore::append_artifact`] merges an artifact into a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMode {
    /// Insert the artifact, replacing any existing artifact with the same id.
    Replace,
    /// Extend the parts of an existing artifact with the same id. A chunk
    /// for an unknown artifact id is dropped.
    AppendParts,
}

/// Persistence contract required by the rest of the system.
///
/// Any operation may fail with [`A2AError::StorageUnavailable`], which
/// surfaces to callers as internal-error.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace a task.
    async fn save_task(&self, task: Task) -> A2AResult<()>;

    /// Fetch a task, optionally truncating history to the most recent
    /// `history_limit` messages (`Some(0)` yields an empty history; a limit
    /// beyond the available history returns it whole).
    async fn get_task(&self, task_id: &str, history_limit: Option<usize>)
        -> A2AResult<Option<Task>>;

    /// Atomically apply a status transition, returning the updated task.
    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> A2AResult<Task>;

    /// Merge an artifact into a task per `mode`.
    async fn append_artifact(
        &self,
        task_id: &str,
        artifact: Artifact,
        mode: ArtifactMode,
    ) -> A2AResult<()>;

    /// Append a message to a task's history, truncating from the front when
    /// the configured maximum is exceeded.
    async fn append_message(&self, task_id: &str, message: Message) -> A2AResult<()>;

    /// Insert or replace a push config for its task.
    async fn save_push_config(&self, config: TaskPushNotificationConfig) -> A2AResult<()>;

    /// Fetch one push config. With `config_id` the specific config; without,
    /// the first registered one.
    async fn get_push_config(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<PushNotificationConfig>>;

    /// All push configs registered for a task.
    async fn list_push_configs(&self, task_id: &str) -> A2AResult<Vec<PushNotificationConfig>>;

    /// Delete a push config. Returns whether it existed.
    async fn delete_push_config(&self, task_id: &str, config_id: &str) -> A2AResult<bool>;
}

struct StoreState {
    tasks: HashMap<String, Task>,
    // task_id -> configs, insertion-ordered so "first" is deterministic.
    push_configs: HashMap<String, Vec<PushNotificationConfig>>,
}

/// In-memory task store.
///
/// Suitable for development, testing, and single-instance deployments; all
/// data is lost on process exit.
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
    max_history_length: usize,
}

impl InMemoryTaskStore {
    /// Create a store with the default history bound (100).
    pub fn new() -> Self {
        Self::with_max_history(100)
    }

    /// Create a store with an explicit history bound.
    pub fn with_max_history(max_history_length: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks: HashMap::new(),
                push_configs: HashMap::new(),
            }),
            max_history_length,
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Trim history to its `limit` most recent entries.
fn truncate_history(task: &mut Task, limit: usize) {
    if limit == 0 {
        task.history = Some(Vec::new());
        return;
    }
    if let Some(ref mut history) = task.history {
        if history.len() > limit {
            let start = history.len() - limit;
            *history = history.split_off(start);
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save_task(&self, task: Task) -> A2AResult<()> {
        let mut state = self.state.lock().await;
        debug!(task_id = %task.id, "Task saved");
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(
        &self,
        task_id: &str,
        history_limit: Option<usize>,
    ) -> A2AResult<Option<Task>> {
        let state = self.state.lock().await;
        let mut task = match state.tasks.get(task_id) {
            Some(task) => task.clone(),
            None => return Ok(None),
        };
        if let Some(limit) = history_limit {
            truncate_history(&mut task, limit);
        }
        Ok(Some(task))
    }

    async fn update_task_status(&self, task_id: &str, mut status: TaskStatus) -> A2AResult<Task> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| A2AError::task_not_found(task_id))?;

        let current = task.status.state;
        if current.is_terminal() {
            if status.state == current {
                // Idempotent reassertion keeps the first application's
                // timestamp.
                debug!(task_id = %task_id, state = %current, "Terminal state re-asserted, no-op");
                return Ok(task.clone());
            }
            return Err(A2AError::invalid_task_state(format!(
                "task {} is {} and cannot transition to {}",
                task_id, current, status.state
            )));
        }

        // updated_at is monotonically non-decreasing.
        if status.updated_at.is_empty() {
            status.updated_at = Utc::now().to_rfc3339();
        } else if let (Some(new), Some(old)) = (
            parse_timestamp(&status.updated_at),
            parse_timestamp(&task.status.updated_at),
        ) {
            if new < old {
                status.updated_at = task.status.updated_at.clone();
            }
        }

        task.status = status;
        Ok(task.clone())
    }

    async fn append_artifact(
        &self,
        task_id: &str,
        artifact: Artifact,
        mode: ArtifactMode,
    ) -> A2AResult<()> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| A2AError::task_not_found(task_id))?;

        let artifacts = task.artifacts.get_or_insert_with(Vec::new);
        let existing_idx = artifacts
            .iter()
            .position(|a| a.artifact_id == artifact.artifact_id);

        match (mode, existing_idx) {
            (ArtifactMode::Replace, Some(idx)) => {
                debug!(task_id = %task_id, artifact_id = %artifact.artifact_id, "Replacing artifact");
                artifacts[idx] = artifact;
            }
            (ArtifactMode::Replace, None) => {
                debug!(task_id = %task_id, artifact_id = %artifact.artifact_id, "Adding artifact");
                artifacts.push(artifact);
            }
            (ArtifactMode::AppendParts, Some(idx)) => {
                debug!(task_id = %task_id, artifact_id = %artifact.artifact_id, "Appending artifact parts");
                artifacts[idx].parts.extend(artifact.parts);
            }
            (ArtifactMode::AppendParts, None) => {
                warn!(
                    task_id = %task_id,
                    artifact_id = %artifact.artifact_id,
                    "Append chunk for unknown artifact, dropping"
                );
            }
        }
        Ok(())
    }

    async fn append_message(&self, task_id: &str, message: Message) -> A2AResult<()> {
        let mut state = self.state.lock().await;
        let max = self.max_history_length;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| A2AError::task_not_found(task_id))?;

        let history = task.history.get_or_insert_with(Vec::new);
        history.push(message);
        if history.len() > max {
            let overflow = history.len() - max;
            history.drain(..overflow);
        }
        Ok(())
    }

    async fn save_push_config(&self, config: TaskPushNotificationConfig) -> A2AResult<()> {
        let mut state = self.state.lock().await;
        let configs = state
            .push_configs
            .entry(config.task_id.clone())
            .or_default();
        let incoming = config.push_notification_config;
        match configs
            .iter()
            .position(|c| c.id.is_some() && c.id == incoming.id)
        {
            Some(idx) => configs[idx] = incoming,
            None => configs.push(incoming),
        }
        Ok(())
    }

    async fn get_push_config(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<PushNotificationConfig>> {
        let state = self.state.lock().await;
        let configs = match state.push_configs.get(task_id) {
            Some(configs) => configs,
            None => return Ok(None),
        };
        let found = match config_id {
            Some(id) => configs.iter().find(|c| c.id.as_deref() == Some(id)),
            None => configs.first(),
        };
        Ok(found.cloned())
    }

    async fn list_push_configs(&self, task_id: &str) -> A2AResult<Vec<PushNotificationConfig>> {
        let state = self.state.lock().await;
        Ok(state.push_configs.get(task_id).cloned().unwrap_or_default())
    }

    async fn delete_push_config(&self, task_id: &str, config_id: &str) -> A2AResult<bool> {
        let mut state = self.state.lock().await;
        let Some(configs) = state.push_configs.get_mut(task_id) else {
            return Ok(false);
        };
        let before = configs.len();
        configs.retain(|c| c.id.as_deref() != Some(config_id));
        let removed = configs.len() < before;
        if configs.is_empty() {
            state.push_configs.remove(task_id);
        }
        Ok(removed)
    }
}

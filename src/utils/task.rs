//! Utility functions for creating and inspecting A2A Task objects.

use uuid::Uuid;

use crate::types::{Message, Task, TaskState};

/// Creates a new submitted task for an incoming message.
///
/// Identifiers come from the message when present; fresh UUID v4 values are
/// generated otherwise. The message becomes the first history entry.
pub fn new_task(message: &Message) -> Task {
    let task_id = message
        .task_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let context_id = message
        .context_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut task = Task::submitted(task_id, context_id);
    task.history = Some(vec![message.clone()]);
    task
}

/// The terminal status message of a finished task, if one was recorded.
pub fn task_terminal_message(task: &Task) -> Option<&Message> {
    if task.status.state.is_terminal() {
        task.status.message.as_ref()
    } else {
        None
    }
}

//! Utility helpers for constructing and inspecting A2A objects.

pub mod message;
pub mod parts;
pub mod task;

pub use message::{get_message_text, new_agent_parts_message, new_agent_text_message};
pub use parts::{get_data_parts, get_text_parts};
pub use task::{new_task, task_terminal_message};

//! Helpers for working with `Part` sequences.

use crate::types::Part;

/// Extracts the text content from every text part, in order.
pub fn get_text_parts(parts: &[Part]) -> Vec<&str> {
    parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Extracts the payload of every data part, in order.
pub fn get_data_parts(parts: &[Part]) -> Vec<&serde_json::Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            Part::Data { data, .. } => Some(data),
            _ => None,
        })
        .collect()
}

//! Shared helpers and error types for the grocery list workspace.

use thiserror::Error;

pub mod logging;

/// Result type for shared helpers.
pub type UtilsResult<T> = Result<T, UtilsError>;

/// Shared error variants for cross-crate helpers.
#[derive(Debug, Error)]
pub enum UtilsError {
    /// An IO error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A parsing error occurred.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Turn a free-form title into a lowercase, dash-separated file name stem.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Collapse line breaks and cap the length of a value before it is logged.
pub fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

//! Report serialization errors.

use serde_json::error::Category;

/// Failure to render a report or summary as JSON.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("JSON Error ({:?}): {} at line {} in {}", category, message, line, file)]
pub struct JsonError {
    message: String,
    category: Category,
    line: u32,
    file: &'static str,
}

impl JsonError {
    /// Error message from the serializer.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the serializer hit bad data, bad syntax, I/O or early EOF.
    pub fn category(&self) -> Category {
        self.category
    }
}

impl From<serde_json::Error> for JsonError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: err.to_string(),
            category: err.classify(),
            line: location.line(),
            file: location.file(),
        }
    }
}

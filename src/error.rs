use crate::analysis::ValidationReport;
use crate::core::task::TaskId;
use thiserror::Error;

/// Broad class of an [`Error`], so callers can decide whether to retry,
/// fix their input, or shed load without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Duplicate node, unknown node reference, or cycle. Never partially applied.
    Structural,
    /// Dangling dependency or schema violation found by the validator.
    Validation,
    /// A bounded structure is full; retry or shed load.
    Capacity,
    /// Executor callback failure, timeout, or invalid state transition.
    Execution,
    /// IO, parsing, or environment problems outside the graph itself.
    Environment,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid dependency pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Duplicate node: {0}")]
    DuplicateNode(TaskId),

    #[error("Unknown node: {0}")]
    UnknownNode(TaskId),

    #[error("Unknown edge: {from} -> {to}")]
    UnknownEdge { from: TaskId, to: TaskId },

    #[error("Adding edge {from} -> {to} would create a cycle")]
    Cycle { from: TaskId, to: TaskId },

    #[error("Cycle detected among nodes: {}", format_ids(.0))]
    CycleDetected(Vec<TaskId>),

    #[error("Validation failed: {0}")]
    Validation(Box<ValidationReport>),

    #[error("Task queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },

    #[error("Task {task_id} failed: {message}")]
    Execution { task_id: TaskId, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Invalid transition for {task_id} from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: String,
        to: String,
    },

    #[error("No graph submitted to the scheduler")]
    NoGraph,
}

impl Error {
    /// Classify this error according to the engine's error taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DuplicateNode(_)
            | Error::UnknownNode(_)
            | Error::UnknownEdge { .. }
            | Error::Cycle { .. }
            | Error::CycleDetected(_) => ErrorCategory::Structural,
            Error::Validation(_) => ErrorCategory::Validation,
            Error::QueueFull { .. } => ErrorCategory::Capacity,
            Error::Execution { .. }
            | Error::Timeout(_)
            | Error::TaskJoin(_)
            | Error::InvalidTransition { .. }
            | Error::NoGraph => ErrorCategory::Execution,
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Pattern(_)
            | Error::NoHomeDir => ErrorCategory::Environment,
        }
    }
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", Error::NoHomeDir), "No home directory");
        assert_eq!(
            format!(
                "{}",
                Error::Cycle {
                    from: TaskId::from("a"),
                    to: TaskId::from("b"),
                }
            ),
            "Adding edge a -> b would create a cycle"
        );
        assert_eq!(
            format!(
                "{}",
                Error::CycleDetected(vec![TaskId::from("x"), TaskId::from("y")])
            ),
            "Cycle detected among nodes: x, y"
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::DuplicateNode(TaskId::from("a")).category(),
            ErrorCategory::Structural
        );
        assert_eq!(
            Error::QueueFull { capacity: 1 }.category(),
            ErrorCategory::Capacity
        );
        assert_eq!(
            Error::Validation(Box::default()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(Error::NoGraph.category(), ErrorCategory::Execution);
        assert_eq!(Error::NoHomeDir.category(), ErrorCategory::Environment);
    }
}

use thiserror::Error;

pub type Result<T, E = KdevError> = std::result::Result<T, E>;

/// Failures surfaced by the kdev core
///
/// Every variant is cloneable so one failure can be returned through a task
/// handle and delivered to the presentation layer at the same time.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KdevError {
    #[error("{0} executable not found, please make sure it is installed")]
    ToolNotFound(String),

    #[error("{0}")]
    ExternalTool(String),

    #[error("failed to start external tool: {0}")]
    Spawn(String),

    #[error("unexpected tool output: {0}")]
    Parse(String),

    #[error("cache persistence failed: {0}")]
    Persistence(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("another operation is still running")]
    Busy,

    #[error("no {0} selected")]
    NotSelected(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("pod has multiple containers, choose one of: {}", .0.join(", "))]
    ContainerRequired(Vec<String>),

    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl From<serde_json::Error> for KdevError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

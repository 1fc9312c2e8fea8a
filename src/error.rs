//! Error taxonomy shared by the task translator, the record store clients and
//! the generative backend.

/// Failures talking to the structured-record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The store understood the request but refused the values in it.
    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected store response: {0}")]
    Malformed(String),
}

/// Failures of a task operation, before or after reaching the store.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("No task found with the name: {0}")]
    NotFound(String),

    #[error("{count} tasks are named '{title}'. Use one of these ids instead: {}", .ids.join(", "))]
    AmbiguousTitle {
        title: String,
        count: usize,
        ids: Vec<String>,
    },

    #[error("Unsupported property: {0}")]
    UnsupportedField(String),

    #[error("'{value}' is not a valid value for {field}: {reason}")]
    UnsupportedValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TaskError {
    pub(crate) fn invalid_date(value: &str) -> Self {
        TaskError::Validation(format!(
            "Invalid date format '{value}'. Use MM/DD/YYYY."
        ))
    }
}

/// Failures of a single call to the generative backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("backend returned an empty completion")]
    Empty,
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => BackendError::Status(status.as_u16()),
            None => BackendError::Transport(e.to_string()),
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Truncates error text shown to chat users.
pub(crate) fn bounded(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

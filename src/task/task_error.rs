/// An error raised by a task while it runs.
///
/// Displaying the error shows its message, followed by the underlying error if there is one.
/// The [`Monitor`](crate::monitor::Monitor) never recovers from a `TaskError`; it wraps it in a
/// [`MonitorError`](crate::monitor::monitor_error::MonitorError) and hands it back to the caller.
#[derive(Debug)]
pub struct TaskError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl TaskError {
    /// Create a new TaskError with the given message and no underlying cause
    pub fn new(message: impl Into<String>) -> Self {
        TaskError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new TaskError describing `message`, caused by `source`
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The message describing what the task was doing when it failed
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(source) => Some(source.as_ref()),
            None => None,
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(error: std::io::Error) -> Self {
        TaskError::with_source("I/O error", error)
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(error: serde_json::Error) -> Self {
        TaskError::with_source("JSON serialization error", error)
    }
}

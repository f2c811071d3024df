use std::path::PathBuf;

use crate::task::task_error::TaskError;

/// The broad category of a [`MonitorError`], for callers that want to branch on what went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ErrorKind {
    /// A condition, task or option was configured with invalid parameters
    InvalidConfiguration,
    /// Two writers tried to bind the same storage path
    ResourceConflict,
    /// An operation was called in a lifecycle state that doesn't allow it
    InvalidState,
    /// A task returned an error while running
    TaskExecutionFailure,
    /// The step counter backing the monitor's iteration count could not be read
    StepCounterFailure,
}

/// An error ocurring while configuring or driving a [`Monitor`](crate::monitor::Monitor)
///
/// Displaying the error shows what went wrong, and for task failures the name of the task and the iteration at which it failed.
#[derive(Debug)]
pub struct MonitorError {
    error_type: MonitorErrorType,
    /// the task error that caused this error, for [`ErrorKind::TaskExecutionFailure`] and [`ErrorKind::StepCounterFailure`]
    source: Option<TaskError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MonitorErrorType {
    InvalidConfiguration { reason: String },
    ResourceConflict { path: PathBuf },
    InvalidState { operation: &'static str, state: &'static str },
    CounterWentBackwards { previous: u64, current: u64 },
    TaskExecution { task: String, iteration: u64 },
    StepCounter,
}

impl MonitorError {
    pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self {
            error_type: MonitorErrorType::InvalidConfiguration {
                reason: reason.into(),
            },
            source: None,
        }
    }

    pub(crate) fn resource_conflict(path: PathBuf) -> Self {
        Self {
            error_type: MonitorErrorType::ResourceConflict { path },
            source: None,
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self {
            error_type: MonitorErrorType::InvalidState { operation, state },
            source: None,
        }
    }

    pub(crate) fn counter_went_backwards(previous: u64, current: u64) -> Self {
        Self {
            error_type: MonitorErrorType::CounterWentBackwards { previous, current },
            source: None,
        }
    }

    pub(crate) fn task_execution(source: TaskError, task: String, iteration: u64) -> Self {
        Self {
            error_type: MonitorErrorType::TaskExecution { task, iteration },
            source: Some(source),
        }
    }

    pub(crate) fn step_counter(source: TaskError) -> Self {
        Self {
            error_type: MonitorErrorType::StepCounter,
            source: Some(source),
        }
    }

    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self.error_type {
            MonitorErrorType::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            MonitorErrorType::ResourceConflict { .. } => ErrorKind::ResourceConflict,
            MonitorErrorType::InvalidState { .. } | MonitorErrorType::CounterWentBackwards { .. } => {
                ErrorKind::InvalidState
            }
            MonitorErrorType::TaskExecution { .. } => ErrorKind::TaskExecutionFailure,
            MonitorErrorType::StepCounter => ErrorKind::StepCounterFailure,
        }
    }

    /// The name of the task that failed, if this error was raised by a task
    pub fn task_name(&self) -> Option<&str> {
        match &self.error_type {
            MonitorErrorType::TaskExecution { task, .. } => Some(task),
            _ => None,
        }
    }

    /// The iteration at which a task failed, if this error was raised by a task
    pub fn iteration(&self) -> Option<u64> {
        match &self.error_type {
            MonitorErrorType::TaskExecution { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.error_type {
            MonitorErrorType::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {}", reason)
            }
            MonitorErrorType::ResourceConflict { path } => {
                write!(
                    f,
                    "a writer is already bound to {}, or to a path inside or containing it",
                    path.display()
                )
            }
            MonitorErrorType::InvalidState { operation, state } => {
                write!(f, "cannot {} a monitor that is {}", operation, state)
            }
            MonitorErrorType::CounterWentBackwards { previous, current } => {
                write!(
                    f,
                    "step counter moved backwards from {} to {}",
                    previous, current
                )
            }
            MonitorErrorType::TaskExecution { task, iteration } => {
                write!(f, "task '{}' failed at iteration {}", task, iteration)?;
                if let Some(source) = &self.source {
                    write!(f, ": {}", source)?;
                }
                Ok(())
            }
            MonitorErrorType::StepCounter => {
                write!(f, "unable to read step counter")?;
                if let Some(source) = &self.source {
                    write!(f, ": {}", source)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(source) => Some(source),
            None => None,
        }
    }
}

use std::{
    cell::RefCell,
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    rc::Rc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SinkBinding, SinkRegistry};
use crate::{monitor::monitor_error::MonitorError, task::task_error::TaskError};

/// An event log shared between several tasks
pub type SharedEventLog = Rc<RefCell<EventLog>>;

/// One scalar written to an [`EventLog`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    /// when the value was recorded
    pub wall_time: DateTime<Utc>,
    /// the iteration at which the value was recorded
    pub step: u64,
    /// the name of the value, e.g. `"kernel.lengthscale"`
    pub tag: String,
    /// the recorded value, always finite
    pub value: f64,
}

/// A scalar log written as JSON lines, one [`ScalarEvent`] per line.
///
/// The log's path is bound in a [`SinkRegistry`] for as long as the log is alive.
/// To have several tasks write to one log, build it once with [`EventLog::shared`] and clone the handle.
#[derive(Debug)]
pub struct EventLog {
    writer: BufWriter<File>,
    binding: SinkBinding,
    flush_immediately: bool,
    events_written: u64,
}

impl EventLog {
    /// Bind `path` in the registry and create (or truncate) the log file there, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns a [`ResourceConflict`](crate::ErrorKind::ResourceConflict) error if the path is already bound,
    /// or an [`InvalidConfiguration`](crate::ErrorKind::InvalidConfiguration) error if the file can't be created.
    pub fn create(registry: &SinkRegistry, path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let binding = registry.bind(path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                MonitorError::invalid_configuration(format!(
                    "unable to create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let file = File::create(path).map_err(|e| {
            MonitorError::invalid_configuration(format!(
                "unable to create event log {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(EventLog {
            writer: BufWriter::new(file),
            binding,
            flush_immediately: false,
            events_written: 0,
        })
    }

    /// Same as [`EventLog::create`], wrapped for sharing between tasks
    pub fn shared(
        registry: &SinkRegistry,
        path: impl AsRef<Path>,
    ) -> Result<SharedEventLog, MonitorError> {
        Ok(Rc::new(RefCell::new(Self::create(registry, path)?)))
    }

    /// Flush to disk after every write instead of leaving it to the buffer
    pub fn with_flush_immediately(mut self, flush_immediately: bool) -> Self {
        self.flush_immediately = flush_immediately;
        self
    }

    /// The path of the log file
    pub fn path(&self) -> &Path {
        self.binding.path()
    }

    /// Number of events written so far
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Append one scalar to the log.
    ///
    /// # Errors
    /// Returns a [`TaskError`] if the value is NaN or infinite (JSON can't represent it), or if the write fails.
    pub fn write_scalar(&mut self, step: u64, tag: &str, value: f64) -> Result<(), TaskError> {
        if !value.is_finite() {
            return Err(TaskError::new(format!(
                "non-finite value {} for '{}' at step {}",
                value, tag, step
            )));
        }
        let event = ScalarEvent {
            wall_time: Utc::now(),
            step,
            tag: tag.to_string(),
            value,
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        self.events_written += 1;
        if self.flush_immediately {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Flush any buffered events to disk
    pub fn flush(&mut self) -> Result<(), TaskError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read every event from a log written by [`EventLog`]
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<ScalarEvent>, TaskError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

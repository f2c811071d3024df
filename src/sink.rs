use std::{
    cell::RefCell,
    path::{Component, Path, PathBuf},
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;

use crate::monitor::monitor_error::MonitorError;

/// A JSON-lines scalar log, the sink most tasks write to.
pub mod event_log;

/// Tracks which storage paths currently have a writer bound to them.
///
/// Every sink a task writes to (an [`EventLog`](event_log::EventLog) file, a checkpoint directory) binds its path here when it is built.
/// Binding a path that is already bound fails with a [`ResourceConflict`](crate::ErrorKind::ResourceConflict) error,
/// so two tasks can never silently write over each other. Tasks that should share a sink share one handle to it instead.
///
/// A binding is released once every handle to it has been dropped.
///
/// # Example
/// ```
/// use monitask::sink::SinkRegistry;
///
/// let registry = SinkRegistry::new();
/// let first = registry.bind("logs/train")?;
/// assert!(registry.bind("logs/train").is_err());
/// assert!(registry.bind("logs/test").is_ok());
///
/// drop(first);
/// assert!(registry.bind("logs/train").is_ok());
/// # Ok::<(), monitask::MonitorError>(())
/// ```
#[derive(Debug, Default)]
pub struct SinkRegistry {
    bound: RefCell<FxHashMap<PathBuf, Weak<()>>>,
}

/// Proof that a path is bound in a [`SinkRegistry`]. The path stays bound for as long as this (or a clone of it) is alive.
#[derive(Debug, Clone)]
pub struct SinkBinding {
    path: PathBuf,
    _token: Rc<()>,
}

impl SinkBinding {
    /// The path this binding holds, as given to [`SinkRegistry::bind`]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `path` to a new writer.
    ///
    /// Paths are made absolute against the working directory and normalised lexically before comparing,
    /// so `logs/./train`, `logs/train` and its absolute form are all the same sink.
    /// A path inside a bound directory, or a directory holding a bound path, overlaps it and can't be bound either.
    ///
    /// # Errors
    /// * [`ResourceConflict`](crate::ErrorKind::ResourceConflict) if the path, or a path overlapping it, is already bound
    /// * [`InvalidConfiguration`](crate::ErrorKind::InvalidConfiguration) if the path can't be made absolute
    pub fn bind(&self, path: impl AsRef<Path>) -> Result<SinkBinding, MonitorError> {
        let path = path.as_ref();
        let key = normalise(path).map_err(|e| {
            MonitorError::invalid_configuration(format!(
                "unable to resolve sink path {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut bound = self.bound.borrow_mut();
        bound.retain(|_, existing| existing.strong_count() > 0);
        if bound
            .keys()
            .any(|existing| key.starts_with(existing) || existing.starts_with(&key))
        {
            return Err(MonitorError::resource_conflict(path.to_path_buf()));
        }
        let token = Rc::new(());
        bound.insert(key, Rc::downgrade(&token));
        Ok(SinkBinding {
            path: path.to_path_buf(),
            _token: token,
        })
    }

    /// Whether `path` itself currently has a live writer bound to it
    pub fn is_bound(&self, path: impl AsRef<Path>) -> bool {
        let Ok(key) = normalise(path.as_ref()) else {
            return false;
        };
        self.bound
            .borrow()
            .get(&key)
            .is_some_and(|existing| existing.strong_count() > 0)
    }

    /// The number of paths with a live writer bound to them
    pub fn len(&self) -> usize {
        self.bound
            .borrow()
            .values()
            .filter(|existing| existing.strong_count() > 0)
            .count()
    }

    /// true if no path has a live writer bound to it
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// absolute, then lexical; the path may not exist yet
fn normalise(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalised = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalised.pop();
            }
            other => normalised.push(other.as_os_str()),
        }
    }
    Ok(normalised)
}

use std::marker::PhantomData;

use crate::task::{task_error::TaskError, MonitorContext, TaskAction};

/// Runs an arbitrary closure over the [`MonitorContext`]. Useful for custom evaluation, e.g. scoring the model against a test set.
pub struct CallbackTask<M, F> {
    callback: F,
    _model: PhantomData<fn(&M)>,
}

impl<M, F> CallbackTask<M, F>
where
    F: FnMut(&MonitorContext<'_, M>) -> Result<(), TaskError>,
{
    /// Create a task action that calls `callback` every time it runs
    pub fn new(callback: F) -> Self {
        CallbackTask {
            callback,
            _model: PhantomData,
        }
    }
}

impl<M, F> TaskAction<M> for CallbackTask<M, F>
where
    F: FnMut(&MonitorContext<'_, M>) -> Result<(), TaskError>,
{
    fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<(), TaskError> {
        (self.callback)(context)
    }

    fn default_name(&self) -> &str {
        "CallbackTask"
    }
}

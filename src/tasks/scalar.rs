use std::marker::PhantomData;

use log::debug;

use crate::{
    sink::event_log::SharedEventLog,
    task::{task_error::TaskError, MonitorContext, TaskAction},
};

/// Computes one scalar with a closure and writes it to an [`EventLog`](crate::sink::event_log::EventLog) under a fixed tag.
///
/// Typical uses are objectives too expensive to compute every step, like the full-dataset objective of a model trained on minibatches,
/// or a metric on a held-out test set.
pub struct ScalarTask<M, F> {
    log: SharedEventLog,
    tag: String,
    compute: F,
    _model: PhantomData<fn(&M)>,
}

impl<M, F> ScalarTask<M, F>
where
    F: FnMut(&MonitorContext<'_, M>) -> Result<f64, TaskError>,
{
    /// Create a task action writing the result of `compute` to `log` as `tag`
    pub fn new(log: SharedEventLog, tag: impl Into<String>, compute: F) -> Self {
        ScalarTask {
            log,
            tag: tag.into(),
            compute,
            _model: PhantomData,
        }
    }
}

impl<M, F> TaskAction<M> for ScalarTask<M, F>
where
    F: FnMut(&MonitorContext<'_, M>) -> Result<f64, TaskError>,
{
    fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<(), TaskError> {
        let value = (self.compute)(context)?;
        debug!("{} = {} at iteration {}", self.tag, value, context.iteration());
        self.log
            .borrow_mut()
            .write_scalar(context.iteration(), &self.tag, value)
    }

    fn default_name(&self) -> &str {
        "ScalarTask"
    }
}

use crate::{
    sink::event_log::SharedEventLog,
    task::{task_error::TaskError, MonitorContext, TaskAction},
    Monitored,
};

/// Writes every scalar parameter of the model to an [`EventLog`](crate::sink::event_log::EventLog), tagged with the parameter's name.
#[derive(Debug)]
pub struct ModelScalarsTask {
    log: SharedEventLog,
    prefix: Option<String>,
}

impl ModelScalarsTask {
    /// Create a task action writing the model's parameters to `log`
    pub fn new(log: SharedEventLog) -> Self {
        ModelScalarsTask { log, prefix: None }
    }

    /// Prepend `prefix/` to every tag, e.g. to tell apart several models writing to one log
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl<M: Monitored> TaskAction<M> for ModelScalarsTask {
    fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<(), TaskError> {
        let mut log = self.log.borrow_mut();
        for (name, value) in context.model().scalar_parameters() {
            let tag = match &self.prefix {
                Some(prefix) => format!("{}/{}", prefix, name),
                None => name,
            };
            log.write_scalar(context.iteration(), &tag, value)?;
        }
        Ok(())
    }

    fn default_name(&self) -> &str {
        "ModelScalarsTask"
    }
}

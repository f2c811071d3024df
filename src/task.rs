use std::time::Duration;

use log::debug;

use crate::condition::{Condition, Moment};
use task_error::TaskError;

/// Contains [`TaskError`](task_error::TaskError), the error type task actions return.
pub mod task_error;

/// Everything a task gets to see when it runs: where the optimisation is, how long it has taken, and the model itself.
#[derive(Debug)]
pub struct MonitorContext<'a, M> {
    pub(crate) iteration: u64,
    pub(crate) init_iteration: u64,
    pub(crate) total_time: Duration,
    pub(crate) optimisation_time: Duration,
    pub(crate) on_exit: bool,
    pub(crate) model: &'a M,
}

impl<'a, M> MonitorContext<'a, M> {
    /// The current iteration
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The iteration at which the monitor was opened. Non-zero when resuming from a step counter
    pub fn init_iteration(&self) -> u64 {
        self.init_iteration
    }

    /// The number of iterations completed since the monitor was opened
    pub fn iterations_since_open(&self) -> u64 {
        self.iteration.saturating_sub(self.init_iteration)
    }

    /// Wall-clock time since the monitor was opened
    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// Wall-clock time since the monitor was opened, minus the time spent running tasks
    pub fn optimisation_time(&self) -> Duration {
        self.optimisation_time
    }

    /// true if the task is running because the monitor is being finalized, rather than because its condition fired
    pub fn on_exit(&self) -> bool {
        self.on_exit
    }

    /// The model under optimisation
    pub fn model(&self) -> &'a M {
        self.model
    }
}

/// The effect a [`Task`] performs when it runs.
///
/// Implement this for custom work, or use one of the actions in [`crate::tasks`].
pub trait TaskAction<M> {
    /// Perform the task's effect.
    ///
    /// # Errors
    /// Any error returned here aborts the current [`tick`](crate::monitor::Monitor::tick) or [`finalize`](crate::monitor::Monitor::finalize) call.
    fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<(), TaskError>;

    /// The name used for reporting when none was set with [`Task::with_name`]
    fn default_name(&self) -> &str {
        "Task"
    }
}

/// A unit of work run by the [`Monitor`](crate::monitor::Monitor), along with when to run it.
///
/// A task runs periodically whenever its [`Condition`] is met, and once more when the monitor is finalized if its exit flag is set.
/// The two are independent: a task may run periodically, only at exit, both, or never.
///
/// # Example
/// ```
/// use monitask::{condition::Condition, task::Task, tasks::CallbackTask};
///
/// let task: Task<()> = Task::new(CallbackTask::new(|_context| Ok(())))
///     .with_name("heartbeat")
///     .with_condition(Condition::periodic(5)?)
///     .with_exit_condition(true);
///
/// assert_eq!(task.name(), "heartbeat");
/// assert!(task.should_run(10));
/// assert!(task.should_run_on_exit());
/// # Ok::<(), monitask::MonitorError>(())
/// ```
pub struct Task<M> {
    action: Box<dyn TaskAction<M>>,
    name: Option<String>,
    condition: Option<Condition>,
    run_on_exit: bool,
    elapsed: Duration,
    runs: u64,
}

impl<M> Task<M> {
    /// Create a task that never runs periodically and doesn't run on exit
    pub fn new<A: TaskAction<M> + 'static>(action: A) -> Self {
        Task {
            action: Box::new(action),
            name: None,
            condition: None,
            run_on_exit: false,
            elapsed: Duration::ZERO,
            runs: 0,
        }
    }

    /// Set the name used for reporting, replacing any previous name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the condition under which the task runs periodically, replacing any previous condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set whether the task runs once more when the monitor is finalized
    pub fn with_exit_condition(mut self, run_on_exit: bool) -> Self {
        self.run_on_exit = run_on_exit;
        self
    }

    /// The configured name, or the action's default name if none was set
    pub fn name(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self.action.default_name(),
        }
    }

    /// The condition under which the task runs periodically, if any
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Whether the task should run periodically at the given moment. Always false if no condition is attached
    pub fn should_run(&self, moment: impl Into<Moment>) -> bool {
        match &self.condition {
            Some(condition) => condition.is_met(&moment.into()),
            None => false,
        }
    }

    /// Whether the task runs once more when the monitor is finalized
    pub fn should_run_on_exit(&self) -> bool {
        self.run_on_exit
    }

    /// Total wall-clock time spent running this task
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of times this task has run, periodic and exit runs included
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Run the task's action, adding the time it took to the task's total.
    ///
    /// Time is accumulated even if the action fails. Errors are passed through untouched.
    pub fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<Duration, TaskError> {
        let start = std::time::Instant::now();
        let result = self.action.run(context);
        let took = start.elapsed();
        self.elapsed += took;
        self.runs += 1;
        debug!(
            "task '{}' ran at iteration {} in {:?}",
            self.name(),
            context.iteration,
            took
        );
        result.map(|_| took)
    }
}

impl<M> std::fmt::Debug for Task<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("condition", &self.condition)
            .field("run_on_exit", &self.run_on_exit)
            .field("elapsed", &self.elapsed)
            .field("runs", &self.runs)
            .finish()
    }
}

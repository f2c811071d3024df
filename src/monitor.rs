use std::{
    fmt,
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{
    condition::Moment,
    monitor_options::{IterationMode, MonitorOptions},
    task::{MonitorContext, Task},
};
use monitor_error::MonitorError;

/// Contains [`MonitorError`](monitor_error::MonitorError) and [`ErrorKind`](monitor_error::ErrorKind).
pub mod monitor_error;

/// Where a [`Monitor`] is in its lifecycle: `Created -> Opened -> Finalized`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// built, but [`Monitor::open`] hasn't been called yet
    Created,
    /// ready to [`tick`](Monitor::tick)
    Opened,
    /// [`Monitor::finalize`] has been called; no more ticks are accepted
    Finalized,
}

impl MonitorState {
    fn describe(&self) -> &'static str {
        match self {
            MonitorState::Created => "not yet open",
            MonitorState::Opened => "already open",
            MonitorState::Finalized => "finalized",
        }
    }
}

/// One task run, as reported in a [`TickRecord`]
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    /// the name of the task that ran
    pub name: String,
    /// how long the run took
    pub took: Duration,
}

/// What happened during a single [`Monitor::tick`]
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    /// the iteration the tick was evaluated at
    pub iteration: u64,
    /// the tasks that ran, in the order they ran
    pub fired: Vec<TaskRun>,
}

impl TickRecord {
    /// Names of the tasks that ran during the tick
    pub fn fired_names(&self) -> Vec<&str> {
        self.fired.iter().map(|run| run.name.as_str()).collect()
    }
}

/// Accumulated timing for one task, as reported in a [`RunSummary`]
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTiming {
    /// the name of the task
    pub name: String,
    /// how many times the task ran, exit runs included
    pub runs: u64,
    /// total wall-clock time spent running the task
    pub elapsed: Duration,
}

/// End-of-run report produced by [`Monitor::finalize`], listing every task in registration order
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// iterations completed between opening and finalizing the monitor
    pub iterations: u64,
    /// wall-clock time between opening and finalizing the monitor
    pub total_time: Duration,
    /// `total_time`, minus the time spent running tasks
    pub optimisation_time: Duration,
    /// timing for every task, in registration order
    pub tasks: Vec<TaskTiming>,
}

impl RunSummary {
    /// The timing for the first task named `name`, if there is one
    pub fn task(&self, name: &str) -> Option<&TaskTiming> {
        self.tasks.iter().find(|timing| timing.name == name)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tasks execution time summary ({} iterations, {:.4}s total, {:.4}s optimising):",
            self.iterations,
            self.total_time.as_secs_f64(),
            self.optimisation_time.as_secs_f64()
        )?;
        for timing in &self.tasks {
            write!(
                f,
                "\n{}:\t{:.4}s ({} runs)",
                timing.name,
                timing.elapsed.as_secs_f64(),
                timing.runs
            )?;
        }
        Ok(())
    }
}

/// Runs a fixed list of [`Task`]s alongside an optimisation loop.
///
/// The monitor is opened before the loop, [`tick`](Monitor::tick)ed once after every optimisation step, and [`finalize`](Monitor::finalize)d once after the loop.
/// Each tick advances the iteration and runs, in registration order, every task whose condition is met.
/// Finalizing runs every task flagged to run on exit, then reports how long each task took.
///
/// Everything is synchronous: a tick returns only once every task it triggered has finished.
/// The first task to fail aborts the tick, and the error is returned to the caller untouched.
///
/// # Example
/// ```
/// use monitask::{
///     condition::Condition, monitor::Monitor, task::Task, tasks::CallbackTask, MonitorOptions,
/// };
/// use std::{cell::Cell, rc::Rc};
///
/// let calls = Rc::new(Cell::new(0));
/// let counted = calls.clone();
/// let task = Task::new(CallbackTask::new(move |_context| {
///     counted.set(counted.get() + 1);
///     Ok(())
/// }))
/// .with_name("count")
/// .with_condition(Condition::periodic(10)?)
/// .with_exit_condition(true);
///
/// let mut model = 0.0_f64;
/// let mut monitor = Monitor::new(
///     vec![task],
///     MonitorOptions { print_summary: false, ..MonitorOptions::default() },
/// );
/// let (_, summary) = monitor.scope(&mut model, |monitor, model| {
///     for _ in 0..25 {
///         *model += 1.0; // one optimisation step
///         monitor.tick(model)?;
///     }
///     Ok::<(), monitask::MonitorError>(())
/// })?;
///
/// assert_eq!(calls.get(), 3); // iterations 10 and 20, then once on exit
/// assert_eq!(summary.task("count").unwrap().runs, 3);
/// # Ok::<(), monitask::MonitorError>(())
/// ```
pub struct Monitor<M> {
    tasks: Vec<Task<M>>,
    iteration_mode: IterationMode,
    print_summary: bool,
    state: MonitorState,
    iteration: u64,
    init_iteration: u64,
    last_ticked: Option<u64>,
    opened_at: Option<Instant>,
    previous_elapsed: Option<Duration>,
    task_time: Duration,
}

impl<M> Monitor<M> {
    /// Build a monitor over `tasks`. Tasks run in the order given.
    pub fn new(tasks: Vec<Task<M>>, options: MonitorOptions) -> Self {
        Monitor {
            tasks,
            iteration_mode: options.iteration_mode,
            print_summary: options.print_summary,
            state: MonitorState::Created,
            iteration: 0,
            init_iteration: 0,
            last_ticked: None,
            opened_at: None,
            previous_elapsed: None,
            task_time: Duration::ZERO,
        }
    }

    /// Start tracking iterations and time.
    ///
    /// The starting iteration is read from the step counter if the [`IterationMode`] has one, otherwise it is 0.
    ///
    /// # Errors
    /// * [`InvalidState`](crate::ErrorKind::InvalidState) if the monitor was already opened
    /// * [`StepCounterFailure`](crate::ErrorKind::StepCounterFailure) if the step counter can't be read
    pub fn open(&mut self) -> Result<(), MonitorError> {
        if self.state != MonitorState::Created {
            return Err(MonitorError::invalid_state("open", self.state.describe()));
        }
        let start = match &self.iteration_mode {
            IterationMode::Counting { resume_from: None } => 0,
            IterationMode::Counting {
                resume_from: Some(counter),
            }
            | IterationMode::External(counter) => {
                counter.read().map_err(MonitorError::step_counter)?
            }
        };
        debug!(
            "opening monitor with {} tasks at iteration {} ({:?})",
            self.tasks.len(),
            start,
            self.iteration_mode
        );
        self.iteration = start;
        self.init_iteration = start;
        // the opening step belongs to whoever advanced the counter to it
        if let IterationMode::External(_) = self.iteration_mode {
            self.last_ticked = Some(start);
        }
        self.opened_at = Some(Instant::now());
        self.state = MonitorState::Opened;
        Ok(())
    }

    /// Record that an optimisation step has completed, and run every task whose condition is met at the new iteration.
    ///
    /// In [`IterationMode::Counting`] the iteration goes up by one. In [`IterationMode::External`] it is read from the counter;
    /// if the counter hasn't moved since the last tick, no task runs, so no task ever runs twice for the same iteration.
    ///
    /// Returns a record of the tasks that ran.
    ///
    /// # Errors
    /// * [`InvalidState`](crate::ErrorKind::InvalidState) if the monitor isn't open, or if the external counter moved backwards
    /// * [`StepCounterFailure`](crate::ErrorKind::StepCounterFailure) if the external counter can't be read
    /// * [`TaskExecutionFailure`](crate::ErrorKind::TaskExecutionFailure) as soon as any task fails. Tasks after it in the list don't run.
    pub fn tick(&mut self, model: &M) -> Result<TickRecord, MonitorError> {
        if self.state != MonitorState::Opened {
            return Err(MonitorError::invalid_state("tick", self.state.describe()));
        }
        let iteration = match &self.iteration_mode {
            IterationMode::Counting { .. } => self.iteration + 1,
            IterationMode::External(counter) => {
                let current = counter.read().map_err(MonitorError::step_counter)?;
                if current < self.iteration {
                    return Err(MonitorError::counter_went_backwards(
                        self.iteration,
                        current,
                    ));
                }
                if self.last_ticked == Some(current) {
                    warn!(
                        "step counter did not advance past iteration {}; skipping tasks",
                        current
                    );
                    return Ok(TickRecord {
                        iteration: current,
                        fired: Vec::new(),
                    });
                }
                current
            }
        };
        self.iteration = iteration;
        self.last_ticked = Some(iteration);

        let elapsed = self.elapsed();
        let moment = Moment {
            iteration,
            elapsed,
            previous_elapsed: self.previous_elapsed,
        };
        self.previous_elapsed = Some(elapsed);

        let context = self.context(model, elapsed, false);
        let mut fired = Vec::new();
        for task in self.tasks.iter_mut() {
            if !task.should_run(moment) {
                continue;
            }
            let took = run_task(task, &context, &mut self.task_time)?;
            fired.push(TaskRun {
                name: task.name().to_string(),
                took,
            });
        }
        Ok(TickRecord { iteration, fired })
    }

    /// Run every task flagged to run on exit, once each and regardless of its periodic condition, then report how long every task took.
    ///
    /// The report is printed, one line per task, if [`MonitorOptions::print_summary`] was set, and is returned either way.
    ///
    /// Call this exactly once, after the last tick. Calling it again runs the exit tasks again and reports again.
    ///
    /// # Errors
    /// * [`InvalidState`](crate::ErrorKind::InvalidState) if the monitor was never opened
    /// * [`TaskExecutionFailure`](crate::ErrorKind::TaskExecutionFailure) as soon as any exit task fails
    pub fn finalize(&mut self, model: &M) -> Result<RunSummary, MonitorError> {
        if self.state == MonitorState::Created {
            return Err(MonitorError::invalid_state("finalize", self.state.describe()));
        }
        self.state = MonitorState::Finalized;

        let context = self.context(model, self.elapsed(), true);
        for task in self.tasks.iter_mut() {
            if task.should_run_on_exit() {
                run_task(task, &context, &mut self.task_time)?;
            }
        }

        let summary = self.summary();
        debug!("monitor finalized at iteration {}", self.iteration);
        if self.print_summary {
            println!("{}", summary);
        }
        Ok(summary)
    }

    /// Open the monitor, hand it and the model to `body`, then finalize the monitor.
    ///
    /// The monitor is finalized whether or not `body` succeeds, so exit tasks (e.g. a final checkpoint) still run after a failed optimisation.
    /// If `body` fails, its error is returned; a failure while finalizing after that is logged and otherwise dropped.
    ///
    /// Returns whatever `body` returned, along with the run summary.
    pub fn scope<T, E, F>(&mut self, model: &mut M, body: F) -> Result<(T, RunSummary), E>
    where
        F: FnOnce(&mut Self, &mut M) -> Result<T, E>,
        E: From<MonitorError>,
    {
        self.open()?;
        match body(self, model) {
            Ok(value) => {
                let summary = self.finalize(model)?;
                Ok((value, summary))
            }
            Err(error) => {
                if let Err(finalize_error) = self.finalize(model) {
                    warn!(
                        "finalizing after a failed optimisation also failed: {}",
                        finalize_error
                    );
                }
                Err(error)
            }
        }
    }

    /// Timing so far for every task, in registration order
    pub fn summary(&self) -> RunSummary {
        let total_time = self.elapsed();
        RunSummary {
            iterations: self.iteration.saturating_sub(self.init_iteration),
            total_time,
            optimisation_time: total_time.saturating_sub(self.task_time),
            tasks: self
                .tasks
                .iter()
                .map(|task| TaskTiming {
                    name: task.name().to_string(),
                    runs: task.runs(),
                    elapsed: task.elapsed(),
                })
                .collect(),
        }
    }

    /// The current iteration
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The current lifecycle state
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// The monitored tasks, in registration order
    pub fn tasks(&self) -> &[Task<M>] {
        &self.tasks
    }

    /// Give the tasks back, e.g. to inspect their timings after the run
    pub fn into_tasks(self) -> Vec<Task<M>> {
        self.tasks
    }

    fn elapsed(&self) -> Duration {
        self.opened_at
            .map(|opened_at| opened_at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    fn context<'a>(&self, model: &'a M, elapsed: Duration, on_exit: bool) -> MonitorContext<'a, M> {
        MonitorContext {
            iteration: self.iteration,
            init_iteration: self.init_iteration,
            total_time: elapsed,
            optimisation_time: elapsed.saturating_sub(self.task_time),
            on_exit,
            model,
        }
    }
}

fn run_task<M>(
    task: &mut Task<M>,
    context: &MonitorContext<'_, M>,
    task_time: &mut Duration,
) -> Result<Duration, MonitorError> {
    let before = task.elapsed();
    let result = task.run(context);
    *task_time += task.elapsed() - before;
    result.map_err(|e| MonitorError::task_execution(e, task.name().to_string(), context.iteration))
}

impl<M> fmt::Debug for Monitor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("tasks", &self.tasks)
            .field("iteration_mode", &self.iteration_mode)
            .field("state", &self.state)
            .field("iteration", &self.iteration)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        condition::Condition, step_counter::SharedStep, task::task_error::TaskError,
        tasks::CallbackTask, ErrorKind,
    };
    use std::{cell::RefCell, rc::Rc};

    /// a task that records the iterations it ran at, and whether each run was an exit run
    fn recording_task(log: &Rc<RefCell<Vec<(u64, bool)>>>) -> Task<()> {
        let log = Rc::clone(log);
        Task::new(CallbackTask::new(move |context: &MonitorContext<'_, ()>| {
            log.borrow_mut().push((context.iteration(), context.on_exit()));
            Ok(())
        }))
    }

    fn quiet() -> MonitorOptions {
        MonitorOptions {
            print_summary: false,
            ..MonitorOptions::default()
        }
    }

    #[test]
    fn test_periodic_task_runs_floor_k_over_p_times() {
        for period in 1..=7_i64 {
            for ticks in [0_u64, 1, 6, 7, 20, 49] {
                let log = Rc::new(RefCell::new(Vec::new()));
                let task = recording_task(&log).with_condition(Condition::periodic(period).unwrap());
                let mut monitor = Monitor::new(vec![task], quiet());
                monitor.open().unwrap();
                for _ in 0..ticks {
                    monitor.tick(&()).unwrap();
                }
                assert_eq!(
                    log.borrow().len() as u64,
                    ticks / period as u64,
                    "period {} ticks {}",
                    period,
                    ticks
                );
                assert!(log
                    .borrow()
                    .iter()
                    .all(|(iteration, _)| iteration % period as u64 == 0));
            }
        }
    }

    #[test]
    fn test_exit_only_task() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log)
            .with_condition(Condition::Never)
            .with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        monitor.open().unwrap();
        for _ in 0..50 {
            let record = monitor.tick(&()).unwrap();
            assert!(record.fired.is_empty());
        }
        assert!(log.borrow().is_empty());
        monitor.finalize(&()).unwrap();
        assert_eq!(*log.borrow(), vec![(50, true)]);
    }

    #[test]
    fn test_task_without_condition_only_runs_on_exit() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        monitor.open().unwrap();
        for _ in 0..10 {
            monitor.tick(&()).unwrap();
        }
        monitor.finalize(&()).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_periodic_and_exit_runs_once_on_finalize() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log)
            .with_condition(Condition::periodic(5).unwrap())
            .with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        monitor.open().unwrap();
        for _ in 0..20 {
            monitor.tick(&()).unwrap();
        }
        monitor.finalize(&()).unwrap();
        let log = log.borrow();
        let exit_runs = log.iter().filter(|(_, on_exit)| *on_exit).count();
        let periodic_runs = log.iter().filter(|(_, on_exit)| !*on_exit).count();
        assert_eq!(exit_runs, 1);
        assert_eq!(periodic_runs, 4);
        // the last periodic run and the exit run share the final iteration
        assert_eq!(log[3], (20, false));
        assert_eq!(log[4], (20, true));
    }

    #[test]
    fn test_tick_after_finalize_is_invalid() {
        let mut monitor: Monitor<()> = Monitor::new(vec![], quiet());
        monitor.open().unwrap();
        monitor.tick(&()).unwrap();
        monitor.finalize(&()).unwrap();
        let error = monitor.tick(&()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidState);
        assert_eq!(monitor.state(), MonitorState::Finalized);
    }

    #[test]
    fn test_lifecycle_misuse() {
        let mut monitor: Monitor<()> = Monitor::new(vec![], quiet());
        assert_eq!(
            monitor.tick(&()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            monitor.finalize(&()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        monitor.open().unwrap();
        assert_eq!(monitor.open().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_finalize_twice_reruns_exit_tasks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        monitor.open().unwrap();
        monitor.finalize(&()).unwrap();
        monitor.finalize(&()).unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_failing_task_aborts_tick() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let failing = Task::new(CallbackTask::new(|context: &MonitorContext<'_, ()>| {
            if context.iteration() == 3 {
                Err(TaskError::new("evaluation diverged"))
            } else {
                Ok(())
            }
        }))
        .with_name("evaluate")
        .with_condition(Condition::Always);
        let after = recording_task(&log).with_condition(Condition::Always);
        let mut monitor = Monitor::new(vec![failing, after], quiet());
        monitor.open().unwrap();
        monitor.tick(&()).unwrap();
        monitor.tick(&()).unwrap();
        let error = monitor.tick(&()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TaskExecutionFailure);
        assert_eq!(error.task_name(), Some("evaluate"));
        assert_eq!(error.iteration(), Some(3));
        // the second task ran on iterations 1 and 2 only
        assert_eq!(*log.borrow(), vec![(1, false), (2, false)]);
    }

    #[test]
    fn test_tasks_run_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let tasks = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let order = Rc::clone(&order);
                Task::new(CallbackTask::new(move |_context: &MonitorContext<'_, ()>| {
                    order.borrow_mut().push(name);
                    Ok(())
                }))
                .with_name(name)
                .with_condition(Condition::Always)
            })
            .collect();
        let mut monitor = Monitor::new(tasks, quiet());
        monitor.open().unwrap();
        let record = monitor.tick(&()).unwrap();
        assert_eq!(record.fired_names(), vec!["first", "second", "third"]);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_twenty_five_ticks_period_ten_with_exit() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log)
            .with_name("checkpoint")
            .with_condition(Condition::periodic(10).unwrap())
            .with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        monitor.open().unwrap();
        for _ in 0..25 {
            monitor.tick(&()).unwrap();
        }
        let summary = monitor.finalize(&()).unwrap();
        assert_eq!(*log.borrow(), vec![(10, false), (20, false), (25, true)]);
        assert_eq!(summary.tasks.len(), 1);
        let timing = summary.task("checkpoint").unwrap();
        assert_eq!(timing.runs, 3);
        assert!(timing.elapsed >= Duration::ZERO);
        assert_eq!(summary.iterations, 25);
        assert!(summary.optimisation_time <= summary.total_time);
        assert_eq!(summary.to_string().lines().count(), 2);
    }

    #[test]
    fn test_resume_from_counter() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_condition(Condition::periodic(10).unwrap());
        let mut monitor = Monitor::new(
            vec![task],
            MonitorOptions {
                iteration_mode: IterationMode::resume_from(SharedStep::new(95)),
                print_summary: false,
            },
        );
        monitor.open().unwrap();
        assert_eq!(monitor.iteration(), 95);
        for _ in 0..10 {
            monitor.tick(&()).unwrap();
        }
        assert_eq!(*log.borrow(), vec![(100, false)]);
        assert_eq!(monitor.summary().iterations, 10);
    }

    #[test]
    fn test_external_counter() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_condition(Condition::periodic(2).unwrap());
        let step = SharedStep::new(0);
        let mut monitor = Monitor::new(
            vec![task],
            MonitorOptions {
                iteration_mode: IterationMode::external(step.clone()),
                print_summary: false,
            },
        );
        monitor.open().unwrap();
        step.set(4);
        assert_eq!(monitor.tick(&()).unwrap().iteration, 4);
        // counter didn't move, so nothing runs again at iteration 4
        assert!(monitor.tick(&()).unwrap().fired.is_empty());
        step.set(5);
        monitor.tick(&()).unwrap();
        step.set(8);
        monitor.tick(&()).unwrap();
        assert_eq!(*log.borrow(), vec![(4, false), (8, false)]);

        step.set(6);
        assert_eq!(
            monitor.tick(&()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_context_times() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_by_task = Rc::clone(&seen);
        let task = Task::new(CallbackTask::new(move |context: &MonitorContext<'_, ()>| {
            seen_by_task
                .borrow_mut()
                .push((context.total_time(), context.optimisation_time()));
            Ok(())
        }))
        .with_condition(Condition::Always);
        let mut monitor = Monitor::new(vec![task], quiet());
        monitor.open().unwrap();
        for _ in 0..5 {
            monitor.tick(&()).unwrap();
        }
        let seen = seen.borrow();
        for window in seen.windows(2) {
            assert!(window[1].0 >= window[0].0);
        }
        assert!(seen.iter().all(|(total, optimising)| optimising <= total));
    }

    #[test]
    fn test_scope_finalizes_when_body_fails() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        let mut model = ();
        let result: Result<((), RunSummary), MonitorError> =
            monitor.scope(&mut model, |monitor, model| {
                monitor.tick(model)?;
                Err(MonitorError::invalid_configuration("optimiser diverged"))
            });
        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(*log.borrow(), vec![(1, true)]);
        assert_eq!(monitor.state(), MonitorState::Finalized);
    }

    #[test]
    fn test_scope_returns_body_error_when_exit_task_fails() {
        let task = Task::new(CallbackTask::new(|_context: &MonitorContext<'_, ()>| {
            Err(TaskError::new("disk full"))
        }))
        .with_exit_condition(true);
        let mut monitor = Monitor::new(vec![task], quiet());
        let mut model = ();
        let result: Result<((), RunSummary), MonitorError> =
            monitor.scope(&mut model, |_monitor, _model| {
                Err(MonitorError::invalid_configuration("optimiser diverged"))
            });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_external_counter_opening_step_already_seen() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_condition(Condition::periodic(5).unwrap());
        let step = SharedStep::new(0);
        let mut monitor = Monitor::new(
            vec![task],
            MonitorOptions {
                iteration_mode: IterationMode::external(step.clone()),
                print_summary: false,
            },
        );
        monitor.open().unwrap();
        let record = monitor.tick(&()).unwrap();
        assert_eq!(record.iteration, 0);
        assert!(record.fired.is_empty());
        step.set(5);
        assert_eq!(monitor.tick(&()).unwrap().fired.len(), 1);
        assert_eq!(*log.borrow(), vec![(5, false)]);
    }

    #[test]
    fn test_external_counter_resumed_step_not_rerun() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task = recording_task(&log).with_condition(Condition::periodic(10).unwrap());
        let step = SharedStep::new(40);
        let mut monitor = Monitor::new(
            vec![task],
            MonitorOptions {
                iteration_mode: IterationMode::external(step.clone()),
                print_summary: false,
            },
        );
        monitor.open().unwrap();
        assert!(monitor.tick(&()).unwrap().fired.is_empty());
        step.set(50);
        monitor.tick(&()).unwrap();
        assert_eq!(*log.borrow(), vec![(50, false)]);
    }
}

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! A library for attaching monitoring work to an optimisation loop.
//!
//! The `monitask` crate runs a list of tasks alongside a model's optimisation: logging parameters every few steps,
//! evaluating an expensive objective every few hundred, checkpointing the model periodically and once more at the end,
//! and anything else you can write as a closure.
//!
//! The [monitor] module contains the [`Monitor`] struct, which the optimisation loop calls once per step.
//! Each [`Task`] decides when it runs through a [`condition::Condition`], and whether it also runs once when the monitor is finalized.
//! Ready-made tasks live in the [tasks] module.
//!
//! The monitor knows nothing about models, gradients or optimisers. It only counts steps, keeps time, and runs tasks in order.
//! Models take part through the [`Monitored`] trait (for parameter logging) and serde's `Serialize` (for checkpoints).
//!
//! # Examples
//! Monitor a model's optimisation, logging its parameters and timings every 10 steps, an objective every 100 steps,
//! and checkpointing every 15 steps and at the end:
//! ```
//! use monitask::{
//!     condition::Condition,
//!     sink::{event_log::EventLog, SinkRegistry},
//!     task::MonitorContext,
//!     tasks::{CheckpointFormat, CheckpointTask, ModelScalarsTask, PrintTimingsTask, ScalarTask},
//!     Monitor, MonitorOptions, Monitored, Task,
//! };
//! use serde::Serialize;
//! use tempfile::tempdir;
//!
//! #[derive(Serialize)]
//! struct Model {
//!     variance: f64,
//! }
//!
//! impl Monitored for Model {
//!     fn scalar_parameters(&self) -> Vec<(String, f64)> {
//!         vec![("variance".to_string(), self.variance)]
//!     }
//! }
//!
//! let run_dir = tempdir()?;
//! // every sink is bound here, so no two tasks can write over each other
//! let registry = SinkRegistry::new();
//! let train_log = EventLog::shared(&registry, run_dir.path().join("train.jsonl"))?;
//!
//! let tasks = vec![
//!     Task::new(PrintTimingsTask::new()).with_condition(Condition::periodic(10)?),
//!     Task::new(ModelScalarsTask::new(train_log.clone())).with_condition(Condition::periodic(10)?),
//!     Task::new(ScalarTask::new(
//!         train_log.clone(),
//!         "objective",
//!         |context: &MonitorContext<'_, Model>| Ok(-context.model().variance),
//!     ))
//!     .with_condition(Condition::periodic(100)?),
//!     Task::new(CheckpointTask::new(
//!         &registry,
//!         run_dir.path().join("checkpoints"),
//!         CheckpointFormat::Json,
//!     )?)
//!     .with_condition(Condition::periodic(15)?)
//!     .with_exit_condition(true),
//! ];
//!
//! let mut model = Model { variance: 1.0 };
//! let mut monitor = Monitor::new(tasks, MonitorOptions::default());
//! let (_, summary) = monitor.scope(&mut model, |monitor, model| {
//!     for _ in 0..200 {
//!         model.variance *= 0.99; // one optimisation step
//!         monitor.tick(model)?;
//!     }
//!     Ok::<(), monitask::MonitorError>(())
//! })?;
//!
//! assert_eq!(summary.iterations, 200);
//! assert_eq!(summary.tasks[3].runs, 14); // 13 periodic checkpoints, plus one on exit
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Contains the [`Condition`](condition::Condition) enum, deciding when a task runs.
pub mod condition;
/// Contains the [`Monitor`] struct, which runs tasks alongside an optimisation loop.
pub mod monitor;
/// Options for building a [`Monitor`] with [`Monitor::new`].
pub mod monitor_options;
/// Path-addressed sinks that tasks write to, and the registry that keeps them from colliding.
pub mod sink;
/// Sources for the optimisation step that live outside the [`Monitor`].
pub mod step_counter;
/// Contains the [`Task`] struct and the [`TaskAction`](task::TaskAction) trait for the work a task does.
pub mod task;
pub mod tasks;

pub use monitor::{
    monitor_error::{ErrorKind, MonitorError},
    Monitor,
};
pub use monitor_options::{IterationMode, MonitorOptions};
pub use task::{task_error::TaskError, Task};

/// Models whose parameters can be logged by [`tasks::ModelScalarsTask`].
pub trait Monitored {
    /// Every scalar parameter of the model, as `(name, value)` pairs.
    /// Names are used as event log tags, so they should be stable between calls.
    fn scalar_parameters(&self) -> Vec<(String, f64)>;
}

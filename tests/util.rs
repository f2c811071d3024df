#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use monitask::{
    condition::Condition, task::MonitorContext, tasks::CallbackTask, Monitored, Task, TaskError,
};
use serde::{Deserialize, Serialize};

/// f(x) = (x - 3)^2, minimised by plain gradient descent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadratic {
    pub x: f64,
}

impl Quadratic {
    pub fn new() -> Self {
        Quadratic { x: 0.0 }
    }

    pub fn objective(&self) -> f64 {
        (self.x - 3.0).powi(2)
    }

    pub fn step(&mut self, learning_rate: f64) {
        self.x -= learning_rate * 2.0 * (self.x - 3.0);
    }
}

impl Monitored for Quadratic {
    fn scalar_parameters(&self) -> Vec<(String, f64)> {
        vec![("x".to_string(), self.x)]
    }
}

/// The iteration of every run of a task, plus whether the run happened on exit
pub type Runs = Rc<RefCell<Vec<(u64, bool)>>>;

/// A task that records every run into the returned [`Runs`]
pub fn recording_task(name: &str, condition: Condition, run_on_exit: bool) -> (Task<Quadratic>, Runs) {
    let runs: Runs = Rc::default();
    let recorded = runs.clone();
    let task = Task::new(CallbackTask::new(
        move |context: &MonitorContext<'_, Quadratic>| {
            recorded
                .borrow_mut()
                .push((context.iteration(), context.on_exit()));
            Ok(())
        },
    ))
    .with_name(name)
    .with_condition(condition)
    .with_exit_condition(run_on_exit);
    (task, runs)
}

/// A task that fails every time it runs
pub fn failing_task(name: &str, condition: Condition) -> Task<Quadratic> {
    Task::new(CallbackTask::new(
        |_context: &MonitorContext<'_, Quadratic>| Err(TaskError::new("sink unavailable")),
    ))
    .with_name(name)
    .with_condition(condition)
}

pub fn iterations(runs: &Runs) -> Vec<u64> {
    runs.borrow().iter().map(|(iteration, _)| *iteration).collect()
}

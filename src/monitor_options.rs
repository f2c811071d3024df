use std::fmt;

use crate::step_counter::StepCounter;

/// How the [`Monitor`](crate::monitor::Monitor) decides the current iteration. Fixed when the monitor is built.
pub enum IterationMode {
    /// The monitor counts iterations itself, adding one on every [`tick`](crate::monitor::Monitor::tick).
    ///
    /// If `resume_from` is set, the count starts from that counter's value when the monitor is opened, otherwise from 0.
    Counting {
        /// counter whose value seeds the iteration count at [`open`](crate::monitor::Monitor::open)
        resume_from: Option<Box<dyn StepCounter>>,
    },
    /// The monitor reads the iteration from an external counter on every tick. The counter is the only source of truth.
    External(Box<dyn StepCounter>),
}

impl IterationMode {
    /// Count iterations from 0
    pub fn counting() -> Self {
        IterationMode::Counting { resume_from: None }
    }

    /// Count iterations, starting from the value `counter` holds when the monitor is opened
    pub fn resume_from<C: StepCounter + 'static>(counter: C) -> Self {
        IterationMode::Counting {
            resume_from: Some(Box::new(counter)),
        }
    }

    /// Read every iteration from `counter`
    pub fn external<C: StepCounter + 'static>(counter: C) -> Self {
        IterationMode::External(Box::new(counter))
    }
}

impl Default for IterationMode {
    fn default() -> Self {
        IterationMode::counting()
    }
}

impl fmt::Debug for IterationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationMode::Counting { resume_from: None } => write!(f, "Counting"),
            IterationMode::Counting {
                resume_from: Some(_),
            } => write!(f, "Counting (resumed)"),
            IterationMode::External(_) => write!(f, "External"),
        }
    }
}

/// Used by [`Monitor::new`](crate::monitor::Monitor::new) to determine how the monitor behaves.
#[derive(Debug)]
pub struct MonitorOptions {
    /// how the current iteration is determined
    pub iteration_mode: IterationMode,
    /// whether [`finalize`](crate::monitor::Monitor::finalize) prints a line per task with the time it took
    pub print_summary: bool,
}

impl Default for MonitorOptions {
    /// Returns a MonitorOptions struct with the following default values:
    /// * `iteration_mode`: IterationMode::Counting, starting from 0
    /// * `print_summary`: true
    fn default() -> Self {
        MonitorOptions {
            iteration_mode: IterationMode::counting(),
            print_summary: true,
        }
    }
}

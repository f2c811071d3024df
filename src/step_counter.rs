use std::{cell::Cell, rc::Rc};

use crate::task::task_error::TaskError;

/// A source of truth for the optimisation step, kept outside the [`Monitor`](crate::monitor::Monitor).
///
/// Used either to seed the monitor's own count when it is opened (resuming a run), or as the monitor's only source of iterations.
/// See [`IterationMode`](crate::monitor_options::IterationMode).
pub trait StepCounter {
    /// Read the current step.
    ///
    /// # Errors
    /// Returns a [`TaskError`] if the underlying store could not be read
    fn read(&self) -> Result<u64, TaskError>;
}

/// An in-memory step counter shared between the optimiser loop and the monitor.
///
/// Cloning a `SharedStep` gives another handle to the same count, so the optimiser can advance it while the monitor reads it.
///
/// # Example
/// ```
/// use monitask::step_counter::{SharedStep, StepCounter};
///
/// let step = SharedStep::new(40);
/// let optimiser_handle = step.clone();
/// optimiser_handle.increment();
/// assert_eq!(step.read()?, 41);
/// # Ok::<(), monitask::TaskError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedStep {
    step: Rc<Cell<u64>>,
}

impl SharedStep {
    /// Create a new counter starting at `step`
    pub fn new(step: u64) -> Self {
        SharedStep {
            step: Rc::new(Cell::new(step)),
        }
    }

    /// The current step
    pub fn get(&self) -> u64 {
        self.step.get()
    }

    /// Overwrite the current step
    pub fn set(&self, step: u64) {
        self.step.set(step);
    }

    /// Advance the step by one, returning the new value
    pub fn increment(&self) -> u64 {
        let next = self.step.get() + 1;
        self.step.set(next);
        next
    }
}

impl StepCounter for SharedStep {
    fn read(&self) -> Result<u64, TaskError> {
        Ok(self.step.get())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_handles_share_count() {
        let step = SharedStep::default();
        let other = step.clone();
        assert_eq!(other.increment(), 1);
        assert_eq!(other.increment(), 2);
        assert_eq!(step.read().unwrap(), 2);
        step.set(17);
        assert_eq!(other.get(), 17);
    }
}

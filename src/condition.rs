use std::{fmt, num::NonZeroU64, time::Duration};

use crate::monitor::monitor_error::MonitorError;

/// A predicate deciding whether a [`Task`](crate::task::Task) should run at a given point in the optimisation.
///
/// Conditions are pure: evaluating one never changes it, so the same condition can be attached to as many tasks as needed.
///
/// # Example
/// ```
/// use monitask::condition::Condition;
///
/// let every_ten = Condition::periodic(10)?;
/// assert!(every_ten.evaluate(20));
/// assert!(!every_ten.evaluate(25));
///
/// assert!(Condition::periodic(0).is_err());
/// # Ok::<(), monitask::MonitorError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Fires whenever the iteration is a multiple of `period`
    Periodic {
        /// the number of iterations between firings
        period: NonZeroU64,
    },
    /// Fires whenever the monitor's wall-clock time crosses a new multiple of `interval`
    Elapsed {
        /// the amount of wall-clock time between firings
        interval: Duration,
    },
    /// Never fires. Useful for tasks that should only run on exit
    Never,
    /// Fires on every iteration
    Always,
}

/// The point in the optimisation at which a [`Condition`] is evaluated.
///
/// `elapsed` is the wall-clock time since the monitor was opened, and `previous_elapsed` the same value at the previous tick, if there was one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    /// the current iteration
    pub iteration: u64,
    /// wall-clock time since the monitor was opened
    pub elapsed: Duration,
    /// wall-clock time since the monitor was opened, as of the previous tick
    pub previous_elapsed: Option<Duration>,
}

impl From<u64> for Moment {
    /// A moment with no clock information, for evaluating iteration-based conditions on their own
    fn from(iteration: u64) -> Self {
        Moment {
            iteration,
            elapsed: Duration::ZERO,
            previous_elapsed: None,
        }
    }
}

impl Condition {
    /// Build a condition firing every `period` iterations.
    ///
    /// # Errors
    /// Returns an [`InvalidConfiguration`](crate::ErrorKind::InvalidConfiguration) error if `period` is not a positive integer.
    pub fn periodic(period: i64) -> Result<Self, MonitorError> {
        u64::try_from(period)
            .ok()
            .and_then(NonZeroU64::new)
            .map(|period| Condition::Periodic { period })
            .ok_or_else(|| {
                MonitorError::invalid_configuration(format!(
                    "periodic condition needs a positive period, got {}",
                    period
                ))
            })
    }

    /// Build a condition firing every time `interval` of wall-clock time has passed since the monitor was opened.
    ///
    /// # Errors
    /// Returns an [`InvalidConfiguration`](crate::ErrorKind::InvalidConfiguration) error if `interval` is zero.
    pub fn elapsed(interval: Duration) -> Result<Self, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::invalid_configuration(
                "elapsed-time condition needs a non-zero interval",
            ));
        }
        Ok(Condition::Elapsed { interval })
    }

    /// Evaluate the condition at `iteration`, without any clock information.
    ///
    /// Time-based conditions never fire when evaluated this way.
    pub fn evaluate(&self, iteration: u64) -> bool {
        self.is_met(&Moment::from(iteration))
    }

    /// Evaluate the condition at the given moment
    pub fn is_met(&self, moment: &Moment) -> bool {
        match self {
            Condition::Periodic { period } => moment.iteration % period.get() == 0,
            Condition::Elapsed { interval } => {
                let previous = moment.previous_elapsed.unwrap_or(Duration::ZERO);
                let interval = interval.as_nanos();
                moment.elapsed.as_nanos() / interval > previous.as_nanos() / interval
            }
            Condition::Never => false,
            Condition::Always => true,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Periodic { period } => write!(f, "every {} iterations", period),
            Condition::Elapsed { interval } => write!(f, "every {:.1?}", interval),
            Condition::Never => write!(f, "never"),
            Condition::Always => write!(f, "every iteration"),
        }
    }
}

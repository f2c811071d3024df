use std::{fmt, time::Duration};

use log::info;

use crate::task::{task_error::TaskError, MonitorContext, TaskAction};

/// Iteration rates computed by [`PrintTimingsTask`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingReport {
    /// the iteration the report was computed at
    pub iteration: u64,
    /// iterations per second since the monitor was opened
    pub overall_rate: f64,
    /// iterations per second since the previous report
    pub recent_rate: f64,
    /// iterations per second of optimisation time, i.e. not counting time spent in tasks
    pub optimisation_rate: f64,
}

impl TimingReport {
    /// Compute the rates at the current point of the run, relative to the `previous` report's point if there was one
    pub fn compute(
        iterations: u64,
        total_time: Duration,
        optimisation_time: Duration,
        previous: Option<(u64, Duration)>,
        iteration: u64,
    ) -> Self {
        let (previous_iterations, previous_time) = previous.unwrap_or((0, Duration::ZERO));
        TimingReport {
            iteration,
            overall_rate: rate(iterations, total_time),
            recent_rate: rate(
                iterations.saturating_sub(previous_iterations),
                total_time.saturating_sub(previous_time),
            ),
            optimisation_rate: rate(iterations, optimisation_time),
        }
    }
}

fn rate(iterations: u64, time: Duration) -> f64 {
    if time.is_zero() {
        0.0
    } else {
        iterations as f64 / time.as_secs_f64()
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Iteration {}\ttotal itr.rate {:.2}/s\trecent itr.rate {:.2}/s\topt.rate {:.2}/s",
            self.iteration, self.overall_rate, self.recent_rate, self.optimisation_rate
        )
    }
}

/// Logs how fast the optimisation is going, at `info` level
#[derive(Debug, Default)]
pub struct PrintTimingsTask {
    previous: Option<(u64, Duration)>,
}

impl PrintTimingsTask {
    /// Create a task action whose first report is relative to the monitor being opened
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> TaskAction<M> for PrintTimingsTask {
    fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<(), TaskError> {
        let iterations = context.iterations_since_open();
        let report = TimingReport::compute(
            iterations,
            context.total_time(),
            context.optimisation_time(),
            self.previous,
            context.iteration(),
        );
        info!("{}", report);
        self.previous = Some((iterations, context.total_time()));
        Ok(())
    }

    fn default_name(&self) -> &str {
        "PrintTimingsTask"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rates() {
        let report = TimingReport::compute(
            100,
            Duration::from_secs(10),
            Duration::from_secs(5),
            Some((50, Duration::from_secs(8))),
            100,
        );
        assert_eq!(report.overall_rate, 10.0);
        assert_eq!(report.recent_rate, 25.0);
        assert_eq!(report.optimisation_rate, 20.0);
    }

    #[test]
    fn test_first_report_is_relative_to_open() {
        let report = TimingReport::compute(
            20,
            Duration::from_secs(4),
            Duration::from_secs(4),
            None,
            120,
        );
        assert_eq!(report.recent_rate, report.overall_rate);
        assert_eq!(report.iteration, 120);
    }

    #[test]
    fn test_zero_time() {
        let report = TimingReport::compute(0, Duration::ZERO, Duration::ZERO, None, 0);
        assert_eq!(report.overall_rate, 0.0);
        assert!(report.to_string().starts_with("Iteration 0"));
    }
}

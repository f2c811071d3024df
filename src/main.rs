use std::{error::Error, f64::consts::PI, path::PathBuf, rc::Rc};

use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter, Log, Metadata, Record};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use shuffle::{fy, shuffler::Shuffler};
use statrs::distribution::Normal;

use monitask::{
    condition::Condition,
    sink::{event_log::EventLog, SinkRegistry},
    task::MonitorContext,
    tasks::{
        latest_checkpoint, restore_checkpoint, CallbackTask, CheckpointFormat, CheckpointStep,
        CheckpointTask, ModelScalarsTask, PrintTimingsTask, ScalarTask,
    },
    IterationMode, Monitor, MonitorOptions, Monitored, Task,
};

/// Fit a small regression model with minibatch gradient descent, with a monitor attached that logs, checkpoints and evaluates the model as it trains.
#[derive(Parser, Debug, Clone)]
struct Cli {
    /// number of optimisation steps to run
    #[arg(short = 'n', long, default_value = "1000")]
    iterations: u64,

    /// number of synthetic samples to generate
    #[arg(long, default_value = "1000")]
    num_samples: usize,

    /// the fraction of the samples held out as the test set
    #[arg(long, default_value = "0.2")]
    test_split: f64,

    /// number of samples per optimisation step
    #[arg(short = 'b', long, default_value = "100")]
    batch_size: usize,

    #[arg(long, alias = "lr", default_value = "0.01")]
    /// the learning rate used to update the model parameters
    learning_rate: f64,

    /// directory for the train and test event logs
    #[arg(long, default_value = "monitor-logs")]
    log_dir: PathBuf,

    /// directory for model checkpoints. If not set, no checkpoints are written
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// file format for checkpoints. Supported formats are: json, cbor, pkl
    #[arg(long, default_value = "json")]
    checkpoint_format: CheckpointFormat,

    /// only keep this many of the newest checkpoints
    #[arg(long)]
    max_to_keep: Option<usize>,

    /// restore the model from the latest checkpoint and continue counting iterations from it
    #[arg(long, requires = "checkpoint_dir")]
    resume: bool,

    /// log iteration rates every this many steps
    #[arg(long, default_value = "10")]
    timings_every: i64,

    /// log the model parameters every this many steps
    #[arg(long, default_value = "10")]
    params_every: i64,

    /// evaluate the objective on the full training set every this many steps
    #[arg(long, default_value = "100")]
    objective_every: i64,

    /// checkpoint the model every this many steps, and once more at the end
    #[arg(long, default_value = "15")]
    checkpoint_every: i64,

    /// evaluate the model on the test set every this many steps
    #[arg(long, default_value = "100")]
    test_every: i64,

    /// increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// don't print the task timing summary at the end of the run
    #[arg(long)]
    no_summary: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let progress = ProgressBar::new(cli.iterations);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "[{elapsed_precise}] [{bar:40.green/white}] {human_pos}/{human_len} {per_sec} ({eta}) {msg}",
            )?,
    );
    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    log::set_boxed_logger(Box::new(ProgressLogger {
        progress: progress.clone(),
        level,
    }))?;
    log::set_max_level(level);
    info!("Using arguments {:?}", cli);

    let (training_data, test_data) = generate_data(cli.num_samples, cli.test_split)?;
    let training_data = Rc::new(training_data);
    let test_data = Rc::new(test_data);
    info!(
        "Data generated. Training: {}, Test: {}",
        training_data.len(),
        test_data.len()
    );

    let mut model = match (&cli.checkpoint_dir, cli.resume) {
        (Some(checkpoint_dir), true) => match latest_checkpoint(checkpoint_dir)? {
            Some(record) => {
                info!("Resuming from checkpoint at iteration {}", record.iteration);
                restore_checkpoint(checkpoint_dir.join(&record.file))?
            }
            None => {
                info!("No checkpoint found in {:?}, starting fresh", checkpoint_dir);
                LinearGaussian::default()
            }
        },
        _ => LinearGaussian::default(),
    };

    let registry = SinkRegistry::new();
    let tasks = build_tasks(&cli, &registry, &progress, &training_data, &test_data)?;
    let iteration_mode = match (&cli.checkpoint_dir, cli.resume) {
        (Some(checkpoint_dir), true) => {
            IterationMode::resume_from(CheckpointStep::new(checkpoint_dir))
        }
        _ => IterationMode::counting(),
    };
    let mut monitor = Monitor::new(
        tasks,
        MonitorOptions {
            iteration_mode,
            // printed once the progress bar has finished
            print_summary: false,
        },
    );

    let (_, summary) = monitor.scope(&mut model, |monitor, model| {
        let mut randomness = thread_rng();
        let mut fys = fy::FisherYates::default();
        let mut order: Vec<usize> = (0..training_data.len()).collect();
        let mut cursor = order.len();
        let batch_size = cli.batch_size.clamp(1, order.len());
        for _ in 0..cli.iterations {
            // start a new epoch once there isn't a full batch left
            if cursor + batch_size > order.len() {
                fys.shuffle(&mut order, &mut randomness)
                    .map_err(|e| e.to_string())?;
                cursor = 0;
            }
            let batch: Vec<&Sample> = order[cursor..cursor + batch_size]
                .iter()
                .map(|&i| &training_data[i])
                .collect();
            cursor += batch_size;
            model.step(&batch, cli.learning_rate);
            monitor.tick(model)?;
        }
        Ok::<(), Box<dyn Error>>(())
    })?;

    progress.finish_with_message("Training complete");
    if !cli.no_summary {
        println!("{}", summary);
    }
    info!("Final model: {:?}", model);
    Ok(())
}

fn build_tasks(
    cli: &Cli,
    registry: &SinkRegistry,
    progress: &ProgressBar,
    training_data: &Rc<Vec<Sample>>,
    test_data: &Rc<Vec<Sample>>,
) -> Result<Vec<Task<LinearGaussian>>, Box<dyn Error>> {
    let train_log = EventLog::shared(registry, cli.log_dir.join("train.jsonl"))?;
    let test_log = EventLog::shared(registry, cli.log_dir.join("test.jsonl"))?;

    let progress = progress.clone();
    let mut tasks = vec![
        Task::new(CallbackTask::new(
            move |_context: &MonitorContext<'_, LinearGaussian>| {
                progress.inc(1);
                Ok(())
            },
        ))
        .with_name("progress")
        .with_condition(Condition::Always),
        Task::new(PrintTimingsTask::new())
            .with_name("print timings")
            .with_condition(Condition::periodic(cli.timings_every)?),
        Task::new(ModelScalarsTask::new(train_log.clone()))
            .with_name("model parameters")
            .with_condition(Condition::periodic(cli.params_every)?),
    ];

    let objective_data = Rc::clone(training_data);
    let batch_size = cli.batch_size;
    tasks.push(
        Task::new(ScalarTask::new(
            train_log,
            "train/objective",
            move |context: &MonitorContext<'_, LinearGaussian>| {
                Ok(context.model().objective(&objective_data, batch_size))
            },
        ))
        .with_name("full objective")
        .with_condition(Condition::periodic(cli.objective_every)?),
    );

    if let Some(checkpoint_dir) = &cli.checkpoint_dir {
        let mut checkpoint = CheckpointTask::new(registry, checkpoint_dir, cli.checkpoint_format)?;
        if let Some(max_to_keep) = cli.max_to_keep {
            checkpoint = checkpoint.with_max_to_keep(max_to_keep)?;
        }
        tasks.push(
            Task::new(checkpoint)
                .with_name("checkpoint")
                .with_condition(Condition::periodic(cli.checkpoint_every)?)
                .with_exit_condition(true),
        );
    }

    let test_data = Rc::clone(test_data);
    tasks.push(
        Task::new(ScalarTask::new(
            test_log,
            "test/rmse",
            move |context: &MonitorContext<'_, LinearGaussian>| {
                Ok(context.model().rmse(&test_data))
            },
        ))
        .with_name("test evaluation")
        .with_condition(Condition::periodic(cli.test_every)?)
        .with_exit_condition(true),
    );

    Ok(tasks)
}

/// Routes log records through the progress bar, so they print above it rather than over it
struct ProgressLogger {
    progress: ProgressBar,
    level: LevelFilter,
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.progress.println(format!(
                "{} {:<5} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    x: f64,
    y: f64,
}

const TRUE_WEIGHT: f64 = 2.5;
const TRUE_BIAS: f64 = -1.0;
const TRUE_NOISE: f64 = 0.3;

/// noisy samples of y = 2.5x - 1, split into training and test sets
fn generate_data(
    num_samples: usize,
    test_split: f64,
) -> Result<(Vec<Sample>, Vec<Sample>), Box<dyn Error>> {
    if !(0.0..1.0).contains(&test_split) {
        return Err(format!("test split must be in [0, 1), got {}", test_split).into());
    }
    let noise = Normal::new(0.0, TRUE_NOISE)?;
    let mut rng = thread_rng();
    let data: Vec<Sample> = (0..num_samples)
        .map(|_| {
            let x = rng.gen_range(-3.0..3.0);
            Sample {
                x,
                y: TRUE_WEIGHT * x + TRUE_BIAS + rng.sample(noise),
            }
        })
        .collect();
    let test_size = (test_split * num_samples as f64) as usize;
    if num_samples - test_size == 0 {
        return Err("not enough samples left to train on".into());
    }
    let mut training_data = data;
    let test_data = training_data.split_off(num_samples - test_size);
    Ok((training_data, test_data))
}

/// y ~ N(weight * x + bias, exp(log_noise)^2)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct LinearGaussian {
    weight: f64,
    bias: f64,
    log_noise: f64,
}

impl LinearGaussian {
    fn predict(&self, x: f64) -> f64 {
        self.weight * x + self.bias
    }

    fn negative_log_likelihood(&self, sample: &Sample) -> f64 {
        let residual = sample.y - self.predict(sample.x);
        let variance = (2.0 * self.log_noise).exp();
        0.5 * (2.0 * PI).ln() + self.log_noise + 0.5 * residual * residual / variance
    }

    /// one gradient descent step on the mean negative log likelihood of the batch
    fn step(&mut self, batch: &[&Sample], learning_rate: f64) {
        if batch.is_empty() {
            return;
        }
        let variance = (2.0 * self.log_noise).exp();
        let (mut d_weight, mut d_bias, mut d_log_noise) = (0.0, 0.0, 0.0);
        for sample in batch {
            let residual = sample.y - self.predict(sample.x);
            d_weight -= residual * sample.x / variance;
            d_bias -= residual / variance;
            d_log_noise += 1.0 - residual * residual / variance;
        }
        let n = batch.len() as f64;
        self.weight -= learning_rate * d_weight / n;
        self.bias -= learning_rate * d_bias / n;
        self.log_noise -= learning_rate * d_log_noise / n;
    }

    /// mean negative log likelihood over the whole dataset, accumulated batch by batch
    fn objective(&self, data: &[Sample], batch_size: usize) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let total: f64 = data
            .chunks(batch_size.max(1))
            .map(|batch| batch.iter().map(|s| self.negative_log_likelihood(s)).sum::<f64>())
            .sum();
        total / data.len() as f64
    }

    fn rmse(&self, data: &[Sample]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let squared: f64 = data
            .iter()
            .map(|s| (s.y - self.predict(s.x)).powi(2))
            .sum();
        (squared / data.len() as f64).sqrt()
    }
}

impl Monitored for LinearGaussian {
    fn scalar_parameters(&self) -> Vec<(String, f64)> {
        vec![
            ("model.weight".to_string(), self.weight),
            ("model.bias".to_string(), self.bias),
            (
                "likelihood.variance".to_string(),
                (2.0 * self.log_noise).exp(),
            ),
        ]
    }
}

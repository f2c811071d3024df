mod util;

use std::time::Duration;

use monitask::{
    condition::Condition,
    sink::{
        event_log::{read_events, EventLog},
        SinkRegistry,
    },
    task::MonitorContext,
    tasks::{
        latest_checkpoint, restore_checkpoint, CheckpointFormat, CheckpointStep, CheckpointTask,
        ModelScalarsTask, PrintTimingsTask, ScalarTask,
    },
    IterationMode, Monitor, MonitorError, MonitorOptions, Task,
};
use tempfile::tempdir;
use util::{recording_task, Quadratic};

fn notebook_tasks(
    registry: &SinkRegistry,
    log_path: &std::path::Path,
    checkpoint_dir: &std::path::Path,
) -> Vec<Task<Quadratic>> {
    let train_log = EventLog::shared(registry, log_path).unwrap();
    vec![
        Task::new(PrintTimingsTask::new()).with_condition(Condition::periodic(10).unwrap()),
        Task::new(ModelScalarsTask::new(train_log.clone()))
            .with_condition(Condition::periodic(10).unwrap()),
        Task::new(ScalarTask::new(
            train_log,
            "objective",
            |context: &MonitorContext<'_, Quadratic>| Ok(context.model().objective()),
        ))
        .with_name("objective")
        .with_condition(Condition::periodic(100).unwrap()),
        Task::new(
            CheckpointTask::new(registry, checkpoint_dir, CheckpointFormat::Json)
                .unwrap()
                .with_max_to_keep(3)
                .unwrap(),
        )
        .with_name("checkpoint")
        .with_condition(Condition::periodic(15).unwrap())
        .with_exit_condition(true),
    ]
}

fn optimise(monitor: &mut Monitor<Quadratic>, model: &mut Quadratic, steps: u64) {
    monitor
        .scope(model, |monitor, model| {
            for _ in 0..steps {
                model.step(0.01);
                monitor.tick(model)?;
            }
            Ok::<(), MonitorError>(())
        })
        .unwrap();
}

#[test_log::test]
fn monitored_optimisation_logs_and_checkpoints() {
    let tmp_dir = tempdir().unwrap();
    let log_path = tmp_dir.path().join("logs").join("train.jsonl");
    let checkpoint_dir = tmp_dir.path().join("checkpoints");
    let registry = SinkRegistry::new();
    let mut monitor = Monitor::new(
        notebook_tasks(&registry, &log_path, &checkpoint_dir),
        MonitorOptions::default(),
    );
    let mut model = Quadratic::new();
    let initial_objective = model.objective();
    optimise(&mut monitor, &mut model, 200);
    let summary = monitor.summary();
    assert_eq!(summary.iterations, 200);
    assert_eq!(summary.task("PrintTimingsTask").unwrap().runs, 20);
    assert_eq!(summary.task("ModelScalarsTask").unwrap().runs, 20);
    assert_eq!(summary.task("objective").unwrap().runs, 2);
    assert_eq!(summary.task("checkpoint").unwrap().runs, 14);
    drop(monitor);

    let events = read_events(&log_path).unwrap();
    let objectives: Vec<(u64, f64)> = events
        .iter()
        .filter(|e| e.tag == "objective")
        .map(|e| (e.step, e.value))
        .collect();
    assert_eq!(objectives.len(), 2);
    assert_eq!(objectives[0].0, 100);
    assert_eq!(objectives[1].0, 200);
    assert!(objectives[1].1 < objectives[0].1);
    assert!(objectives[0].1 < initial_objective);
    let parameter_steps: Vec<u64> = events
        .iter()
        .filter(|e| e.tag == "x")
        .map(|e| e.step)
        .collect();
    assert_eq!(parameter_steps, (1..=20).map(|i| i * 10).collect::<Vec<u64>>());

    let latest = latest_checkpoint(&checkpoint_dir).unwrap().unwrap();
    assert_eq!(latest.iteration, 200);
    let restored: Quadratic = restore_checkpoint(checkpoint_dir.join(&latest.file)).unwrap();
    assert!((restored.x - model.x).abs() < 1e-12);
    let kept = std::fs::read_dir(&checkpoint_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|e| e == "json"))
        .filter(|entry| entry.file_name() != "latest.json")
        .count();
    assert_eq!(kept, 3);
}

#[test_log::test]
fn second_session_resumes_from_checkpoint() {
    let tmp_dir = tempdir().unwrap();
    let checkpoint_dir = tmp_dir.path().join("checkpoints");
    let registry = SinkRegistry::new();

    let mut model = Quadratic::new();
    {
        let mut monitor = Monitor::new(
            notebook_tasks(&registry, &tmp_dir.path().join("first.jsonl"), &checkpoint_dir),
            MonitorOptions {
                print_summary: false,
                ..MonitorOptions::default()
            },
        );
        optimise(&mut monitor, &mut model, 40);
    }
    // the first session's sinks were released when its monitor dropped
    assert!(!registry.is_bound(&checkpoint_dir));

    let latest = latest_checkpoint(&checkpoint_dir).unwrap().unwrap();
    assert_eq!(latest.iteration, 40);
    let mut resumed: Quadratic = restore_checkpoint(checkpoint_dir.join(&latest.file)).unwrap();
    let (marker, runs) = recording_task("every ten", Condition::periodic(10).unwrap(), false);
    let mut tasks = notebook_tasks(&registry, &tmp_dir.path().join("second.jsonl"), &checkpoint_dir);
    tasks.push(marker);
    let mut monitor = Monitor::new(
        tasks,
        MonitorOptions {
            iteration_mode: IterationMode::resume_from(CheckpointStep::new(&checkpoint_dir)),
            print_summary: false,
        },
    );
    optimise(&mut monitor, &mut resumed, 25);

    assert_eq!(util::iterations(&runs), vec![50, 60]);
    assert_eq!(monitor.summary().iterations, 25);
    drop(monitor);
    assert_eq!(latest_checkpoint(&checkpoint_dir).unwrap().unwrap().iteration, 65);
}

#[test]
fn elapsed_condition_fires_after_interval() {
    let (task, runs) = recording_task(
        "timed",
        Condition::elapsed(Duration::from_millis(20)).unwrap(),
        false,
    );
    let mut monitor = Monitor::new(
        vec![task],
        MonitorOptions {
            print_summary: false,
            ..MonitorOptions::default()
        },
    );
    let model = Quadratic::new();
    monitor.open().unwrap();
    for _ in 0..5 {
        monitor.tick(&model).unwrap();
    }
    std::thread::sleep(Duration::from_millis(25));
    monitor.tick(&model).unwrap();
    monitor.tick(&model).unwrap();
    monitor.finalize(&model).unwrap();
    // the sleep crosses at least one interval boundary between ticks 5 and 6
    assert!(util::iterations(&runs).contains(&6));
    assert!(runs.borrow().iter().all(|(_, on_exit)| !on_exit));
    assert!(Condition::elapsed(Duration::ZERO).is_err());
}

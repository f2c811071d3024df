use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    monitor::monitor_error::MonitorError,
    sink::{SinkBinding, SinkRegistry},
    step_counter::StepCounter,
    task::{task_error::TaskError, MonitorContext, TaskAction},
};

const INDEX_FILE: &str = "latest.json";

/// The file format a [`CheckpointTask`] writes the model in
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckpointFormat {
    /// `.json`, via serde_json
    Json,
    /// `.cbor`, via ciborium
    #[cfg(feature = "serialization")]
    Cbor,
    /// `.pkl`, via serde-pickle. Also parses from `pickle`
    #[cfg(feature = "serialization")]
    #[strum(serialize = "pickle", to_string = "pkl")]
    Pickle,
}

impl CheckpointFormat {
    /// The file extension checkpoints in this format are written with
    pub fn extension(&self) -> &'static str {
        match self {
            CheckpointFormat::Json => "json",
            #[cfg(feature = "serialization")]
            CheckpointFormat::Cbor => "cbor",
            #[cfg(feature = "serialization")]
            CheckpointFormat::Pickle => "pkl",
        }
    }

    /// The format matching a file extension, if it is supported
    pub fn from_extension(extension: &str) -> Option<Self> {
        extension.parse().ok()
    }

    fn write<M: Serialize>(
        &self,
        model: &M,
        writer: &mut BufWriter<File>,
    ) -> Result<(), TaskError> {
        match self {
            CheckpointFormat::Json => serde_json::to_writer(writer, model)?,
            #[cfg(feature = "serialization")]
            CheckpointFormat::Cbor => ciborium::into_writer(model, writer)
                .map_err(|e| TaskError::with_source("CBOR serialization error", e))?,
            #[cfg(feature = "serialization")]
            CheckpointFormat::Pickle => serde_pickle::to_writer(writer, model, Default::default())
                .map_err(|e| TaskError::with_source("pickle serialization error", e))?,
        }
        Ok(())
    }

    fn read<M: DeserializeOwned>(&self, reader: BufReader<File>) -> Result<M, TaskError> {
        let model = match self {
            CheckpointFormat::Json => serde_json::from_reader(reader)?,
            #[cfg(feature = "serialization")]
            CheckpointFormat::Cbor => ciborium::from_reader(reader)
                .map_err(|e| TaskError::with_source("CBOR deserialization error", e))?,
            #[cfg(feature = "serialization")]
            CheckpointFormat::Pickle => serde_pickle::from_reader(reader, Default::default())
                .map_err(|e| TaskError::with_source("pickle deserialization error", e))?,
        };
        Ok(model)
    }
}

/// One checkpoint written by a [`CheckpointTask`], as recorded in the checkpoint directory's index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// the iteration the model was saved at
    pub iteration: u64,
    /// the checkpoint's file name, relative to the checkpoint directory
    pub file: String,
    /// the format the file was written in
    pub format: CheckpointFormat,
    /// when the checkpoint was written
    pub wall_time: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointIndex {
    /// oldest first
    kept: Vec<CheckpointRecord>,
}

/// Saves the model to a directory, one file per checkpoint, named `<prefix>-<iteration>.<extension>`.
///
/// The directory is bound in the [`SinkRegistry`], so two checkpoint tasks can't share it.
/// An index of the checkpoints kept so far is maintained in `latest.json` inside the directory,
/// which [`latest_checkpoint`] and [`CheckpointStep`] read back when resuming.
/// If the directory already has an index, new checkpoints are added to it.
///
/// Saving twice at the same iteration (e.g. a periodic save on the last iteration, then the exit save) overwrites the first file.
#[derive(Debug)]
pub struct CheckpointTask {
    binding: SinkBinding,
    prefix: String,
    format: CheckpointFormat,
    max_to_keep: Option<usize>,
    index: CheckpointIndex,
}

impl CheckpointTask {
    /// Bind `dir` and prepare it for checkpoints, creating it if needed.
    ///
    /// # Errors
    /// * [`ResourceConflict`](crate::ErrorKind::ResourceConflict) if the directory is already bound
    /// * [`InvalidConfiguration`](crate::ErrorKind::InvalidConfiguration) if the directory can't be created, or holds an unreadable index
    pub fn new(
        registry: &SinkRegistry,
        dir: impl AsRef<Path>,
        format: CheckpointFormat,
    ) -> Result<Self, MonitorError> {
        let dir = dir.as_ref();
        let binding = registry.bind(dir)?;
        fs::create_dir_all(dir).map_err(|e| {
            MonitorError::invalid_configuration(format!(
                "unable to create checkpoint directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let index = read_index(dir)
            .map_err(|e| {
                MonitorError::invalid_configuration(format!(
                    "unable to read checkpoint index in {}: {}",
                    dir.display(),
                    e
                ))
            })?
            .unwrap_or_default();
        Ok(CheckpointTask {
            binding,
            prefix: "checkpoint".to_string(),
            format,
            max_to_keep: None,
            index,
        })
    }

    /// Set the prefix of checkpoint file names. Defaults to `checkpoint`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Keep only the newest `max_to_keep` checkpoints, deleting older ones as new ones are written.
    ///
    /// # Errors
    /// Returns an [`InvalidConfiguration`](crate::ErrorKind::InvalidConfiguration) error if `max_to_keep` is 0
    pub fn with_max_to_keep(mut self, max_to_keep: usize) -> Result<Self, MonitorError> {
        if max_to_keep == 0 {
            return Err(MonitorError::invalid_configuration(
                "max_to_keep must keep at least one checkpoint",
            ));
        }
        self.max_to_keep = Some(max_to_keep);
        Ok(self)
    }

    /// The checkpoint directory
    pub fn dir(&self) -> &Path {
        self.binding.path()
    }

    fn save<M: Serialize>(&mut self, model: &M, iteration: u64) -> Result<PathBuf, TaskError> {
        let file = format!("{}-{}.{}", self.prefix, iteration, self.format.extension());
        let path = self.dir().join(&file);
        let format = self.format;
        write_atomically(&path, |writer| format.write(model, writer))?;

        self.index.kept.retain(|record| record.file != file);
        self.index.kept.push(CheckpointRecord {
            iteration,
            file,
            format,
            wall_time: Utc::now(),
        });
        if let Some(max_to_keep) = self.max_to_keep {
            while self.index.kept.len() > max_to_keep {
                let oldest = self.index.kept.remove(0);
                match fs::remove_file(self.dir().join(&oldest.file)) {
                    Ok(()) => debug!("removed old checkpoint {}", oldest.file),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        let index = &self.index;
        write_atomically(&self.dir().join(INDEX_FILE), |writer| {
            serde_json::to_writer_pretty(writer, index)?;
            Ok(())
        })?;
        Ok(path)
    }
}

impl<M: Serialize> TaskAction<M> for CheckpointTask {
    fn run(&mut self, context: &MonitorContext<'_, M>) -> Result<(), TaskError> {
        let path = self.save(context.model(), context.iteration())?;
        info!(
            "saved checkpoint {} at iteration {}",
            path.display(),
            context.iteration()
        );
        Ok(())
    }

    fn default_name(&self) -> &str {
        "CheckpointTask"
    }
}

/// Reads the latest checkpoint's iteration from a checkpoint directory, or 0 if there are no checkpoints yet.
///
/// Use with [`IterationMode::resume_from`](crate::monitor_options::IterationMode::resume_from) to continue counting where a previous run stopped.
#[derive(Debug, Clone)]
pub struct CheckpointStep {
    dir: PathBuf,
}

impl CheckpointStep {
    /// Read steps from the checkpoint directory `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointStep { dir: dir.into() }
    }
}

impl StepCounter for CheckpointStep {
    fn read(&self) -> Result<u64, TaskError> {
        Ok(latest_checkpoint(&self.dir)?.map_or(0, |record| record.iteration))
    }
}

/// The newest checkpoint recorded in a checkpoint directory, if there is one
pub fn latest_checkpoint(dir: impl AsRef<Path>) -> Result<Option<CheckpointRecord>, TaskError> {
    Ok(read_index(dir.as_ref())?.and_then(|mut index| index.kept.pop()))
}

/// Load a model from a checkpoint file, picking the format from the file's extension
pub fn restore_checkpoint<M: DeserializeOwned>(path: impl AsRef<Path>) -> Result<M, TaskError> {
    let path = path.as_ref();
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = CheckpointFormat::from_extension(extension).ok_or_else(|| {
        TaskError::new(format!(
            "unsupported checkpoint extension '{}' for {}",
            extension,
            path.display()
        ))
    })?;
    debug!("restoring {} checkpoint from {}", format, path.display());
    format.read(BufReader::new(File::open(path)?))
}

fn read_index(dir: &Path) -> Result<Option<CheckpointIndex>, TaskError> {
    let file = match File::open(dir.join(INDEX_FILE)) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}

// the target is only ever replaced by a complete file: write alongside it, then rename over it
fn write_atomically<F>(path: &Path, write: F) -> Result<(), TaskError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), TaskError>,
{
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    write(&mut writer)?;
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

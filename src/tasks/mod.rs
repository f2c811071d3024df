//! Ready-made [`TaskAction`](crate::task::TaskAction)s for the usual monitoring jobs.
//!
//! Wrap any of these in a [`Task`](crate::task::Task) to give it a name, a condition and an exit flag.

mod callback;
mod checkpoint;
mod model_scalars;
mod scalar;
mod timings;

pub use callback::CallbackTask;
pub use checkpoint::{
    latest_checkpoint, restore_checkpoint, CheckpointFormat, CheckpointRecord, CheckpointStep,
    CheckpointTask,
};
pub use model_scalars::ModelScalarsTask;
pub use scalar::ScalarTask;
pub use timings::{PrintTimingsTask, TimingReport};

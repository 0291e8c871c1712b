//! Worker tasks that drive load against a blocking pool.

pub mod sampler;
pub mod task;

pub use sampler::{LoadSampler, ScriptedSampler, UniformSampler};
pub use task::{WorkerOutcome, WorkerState, WorkerTask};

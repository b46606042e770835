pub mod archive;
pub mod compose;
pub mod config;
pub mod engine;
pub mod estimate;
pub mod gate;
pub mod pipeline;
pub mod snapshot;
pub mod space;
pub mod workload;

pub use config::RestoreConfig;
pub use gate::ExecutionMode;
pub use pipeline::{RestoreError, RestorePipeline, RestoreReport, Stage, StageOutcome};

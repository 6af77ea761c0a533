//! Worker side: owns the artifact, runs steps, checkpoints, and reports progress.

mod loop_;
mod metrics;
pub mod progress;
mod session;

pub use loop_::{Phase, WorkerLoop};
pub use metrics::WorkerMetrics;
pub use session::Session;

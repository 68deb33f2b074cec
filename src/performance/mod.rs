pub mod metrics;
pub mod monitor;
pub mod runner;
pub mod schedule;
pub mod thresholds;

pub use metrics::{PerformanceResults, RunMetrics};
pub use runner::LoadDriver;
pub use schedule::{Schedule, Stage};
pub use thresholds::{evaluate, ThresholdBreach};

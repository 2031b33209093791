//! Performance counters for the QueryLens analysis pipeline.
//!
//! Counts, durations and validator confidence adjustments per operation.
//! Counters are advisory: they never influence analysis results.

pub mod counters;
pub mod model;

pub use counters::{OperationTimer, PerformanceCounters};
pub use model::{CountersSnapshot, OperationSnapshot};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

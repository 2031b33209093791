//! Reporting types for performance counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub operation: String,
    pub count: u64,
    pub failures: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    /// Sum of confidence adjustments made by the validator.
    pub confidence_delta: f64,
}

/// Point-in-time copy of all counters, sorted by operation name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub taken_at: DateTime<Utc>,
    pub operations: Vec<OperationSnapshot>,
}

impl CountersSnapshot {
    pub fn get(&self, operation: &str) -> Option<&OperationSnapshot> {
        self.operations.iter().find(|o| o.operation == operation)
    }

    pub fn to_json(&self) -> Result<String, crate::TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

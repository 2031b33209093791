//! Lock-light performance counters.
//!
//! The operation map is behind an `RwLock` that is only written when an
//! operation is seen for the first time; every update after that is a
//! relaxed atomic add on the operation's own counters.

use crate::model::{CountersSnapshot, OperationSnapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Confidence deltas are stored in thousandths.
const DELTA_SCALE: f64 = 1000.0;

#[derive(Debug, Default)]
struct OperationCounter {
    count: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
    confidence_delta_milli: AtomicI64,
}

/// Advisory per-operation metrics shared across analyses.
#[derive(Debug, Default)]
pub struct PerformanceCounters {
    operations: RwLock<HashMap<String, Arc<OperationCounter>>>,
}

impl PerformanceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, operation: &str) -> Arc<OperationCounter> {
        if let Some(counter) = self
            .operations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(operation)
        {
            return counter.clone();
        }
        self.operations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(operation.to_string())
            .or_default()
            .clone()
    }

    /// Record one completed operation.
    pub fn record(&self, operation: &str, elapsed: Duration, succeeded: bool) {
        let counter = self.counter(operation);
        counter.count.fetch_add(1, Ordering::Relaxed);
        counter
            .total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if !succeeded {
            counter.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Accumulate a confidence adjustment (adjusted minus original).
    pub fn record_confidence_delta(&self, operation: &str, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        let milli = (delta * DELTA_SCALE).round() as i64;
        self.counter(operation)
            .confidence_delta_milli
            .fetch_add(milli, Ordering::Relaxed);
    }

    /// Start timing `operation`; the returned timer records when finished.
    pub fn start<'a>(&'a self, operation: &'a str) -> OperationTimer<'a> {
        OperationTimer {
            counters: self,
            operation,
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let operations = self.operations.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshots: Vec<OperationSnapshot> = operations
            .iter()
            .map(|(name, c)| {
                let count = c.count.load(Ordering::Relaxed);
                let total_micros = c.total_micros.load(Ordering::Relaxed);
                OperationSnapshot {
                    operation: name.clone(),
                    count,
                    failures: c.failures.load(Ordering::Relaxed),
                    total_ms: total_micros as f64 / 1000.0,
                    avg_ms: if count == 0 {
                        0.0
                    } else {
                        total_micros as f64 / 1000.0 / count as f64
                    },
                    confidence_delta: c.confidence_delta_milli.load(Ordering::Relaxed) as f64
                        / DELTA_SCALE,
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.operation.cmp(&b.operation));
        CountersSnapshot {
            taken_at: Utc::now(),
            operations: snapshots,
        }
    }
}

/// Timing handle returned by [`PerformanceCounters::start`].
pub struct OperationTimer<'a> {
    counters: &'a PerformanceCounters,
    operation: &'a str,
    started: Instant,
}

impl OperationTimer<'_> {
    pub fn finish(self, succeeded: bool) {
        self.counters
            .record(self.operation, self.started.elapsed(), succeeded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_durations_accumulate() {
        let counters = PerformanceCounters::new();
        counters.record("intent", Duration::from_millis(10), true);
        counters.record("intent", Duration::from_millis(30), false);

        let snap = counters.snapshot();
        let intent = snap.get("intent").unwrap();
        assert_eq!(intent.count, 2);
        assert_eq!(intent.failures, 1);
        assert!((intent.total_ms - 40.0).abs() < 1e-6);
        assert!((intent.avg_ms - 20.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_delta_is_signed() {
        let counters = PerformanceCounters::new();
        counters.record_confidence_delta("validation", -0.25);
        counters.record_confidence_delta("validation", 0.05);
        counters.record_confidence_delta("validation", f64::NAN);
        let snap = counters.snapshot();
        assert!((snap.get("validation").unwrap().confidence_delta + 0.2).abs() < 1e-9);
    }

    #[test]
    fn timer_records_on_finish() {
        let counters = PerformanceCounters::new();
        counters.start("analyze").finish(true);
        assert_eq!(counters.snapshot().get("analyze").unwrap().count, 1);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let counters = Arc::new(PerformanceCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.record("domain", Duration::from_micros(1), true);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counters.snapshot().get("domain").unwrap().count, 8000);
    }
}

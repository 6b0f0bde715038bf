use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::ProgressEvent;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProgressMetrics {
    pub items_processed: u64,
    pub items_total: u64,
    pub percentage: u8,
    pub elapsed_ms: u64,
    pub estimated_remaining_ms: Option<u64>,
    pub counters: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsOutcome {
    Changed,
    Unchanged,
    /// Older than the newest metrics event already applied; dropped.
    Stale,
}

/// Folds item/progress events into [`ProgressMetrics`].
///
/// Item counts are overwritten, never accumulated: the server is authoritative.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsAggregator {
    metrics: ProgressMetrics,
    counter_keys: Vec<String>,
    newest_applied: Option<DateTime<Utc>>,
}

impl MetricsAggregator {
    pub fn new(counter_keys: &[String]) -> Self {
        Self {
            metrics: ProgressMetrics::default(),
            counter_keys: counter_keys.to_vec(),
            newest_applied: None,
        }
    }

    pub fn metrics(&self) -> &ProgressMetrics {
        &self.metrics
    }

    /// Applies one event received `elapsed_ms` into the session.
    pub fn apply(&mut self, event: &ProgressEvent, elapsed_ms: u64) -> MetricsOutcome {
        if !event.carries_metrics() {
            return MetricsOutcome::Unchanged;
        }
        if let (Some(occurred_at), Some(newest)) = (event.occurred_at, self.newest_applied) {
            if occurred_at < newest {
                return MetricsOutcome::Stale;
            }
        }
        if let Some(occurred_at) = event.occurred_at {
            self.newest_applied = Some(occurred_at);
        }

        let before = self.metrics.clone();
        let payload = &event.payload;
        if let Some(processed) = payload.items_processed {
            self.metrics.items_processed = processed;
        }
        if let Some(total) = payload.items_total {
            self.metrics.items_total = total;
        }

        if self.metrics.items_total > 0 {
            self.metrics.percentage =
                percentage_of(self.metrics.items_processed, self.metrics.items_total);
        } else if let Some(progress) = payload.progress {
            self.metrics.percentage = progress.round().clamp(0.0, 100.0) as u8;
        }

        for (key, value) in &payload.details {
            let Some(number) = value.as_f64() else {
                continue;
            };
            if self.counter_keys.is_empty() || self.counter_keys.iter().any(|k| k == key) {
                self.metrics.counters.insert(key.clone(), number);
            }
        }

        self.metrics.elapsed_ms = elapsed_ms;
        self.metrics.estimated_remaining_ms = estimate_remaining(elapsed_ms, self.metrics.percentage);

        if self.metrics == before {
            MetricsOutcome::Unchanged
        } else {
            MetricsOutcome::Changed
        }
    }

    /// Advances the elapsed clock only; the estimate is left alone so it does
    /// not jitter between events.
    pub fn tick(&mut self, elapsed_ms: u64) -> bool {
        if self.metrics.elapsed_ms == elapsed_ms {
            return false;
        }
        self.metrics.elapsed_ms = elapsed_ms;
        true
    }

    /// Final bookkeeping once the session reaches a terminal state.
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.metrics.elapsed_ms = elapsed_ms;
        self.metrics.estimated_remaining_ms = None;
    }
}

/// `round(processed / total * 100)`, capped at 100 when the server reports
/// more processed items than the announced total.
pub fn percentage_of(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = processed as f64 / total as f64;
    (ratio * 100.0).round().min(100.0) as u8
}

/// Linear extrapolation, only defined strictly between 0 and 100 percent.
pub fn estimate_remaining(elapsed_ms: u64, percentage: u8) -> Option<u64> {
    if percentage == 0 || percentage >= 100 {
        return None;
    }
    let remaining = elapsed_ms as f64 * (100.0 / f64::from(percentage) - 1.0);
    Some(remaining.max(0.0).round() as u64)
}

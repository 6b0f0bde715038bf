use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::ProgressEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Local receipt time; the log is ordered by this, never by `occurred_at`.
    pub received_at: DateTime<Utc>,
    pub event: ProgressEvent,
}

/// Append-only FIFO of the most recent events. Once full, each insert evicts
/// the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    /// Owned copy of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries dropped to make room since the log was created.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

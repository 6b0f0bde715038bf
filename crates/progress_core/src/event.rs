use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant of a progress event as sent by the job backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Connection,
    Heartbeat,
    PhaseChange,
    ItemExamined,
    Progress,
    Step,
    Complete,
    Error,
    /// Kind the consumer does not know; kept for the event log only.
    Unclassified(String),
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "connection" | "connected" => EventKind::Connection,
            "heartbeat" => EventKind::Heartbeat,
            "phase_change" => EventKind::PhaseChange,
            "item_examined" | "file_examined" => EventKind::ItemExamined,
            "progress" => EventKind::Progress,
            "step" => EventKind::Step,
            "complete" => EventKind::Complete,
            "error" => EventKind::Error,
            other => EventKind::Unclassified(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Heartbeat => "heartbeat",
            EventKind::PhaseChange => "phase_change",
            EventKind::ItemExamined => "item_examined",
            EventKind::Progress => "progress",
            EventKind::Step => "step",
            EventKind::Complete => "complete",
            EventKind::Error => "error",
            EventKind::Unclassified(raw) => raw,
        }
    }

    /// Kinds that report work on the job itself. Connection chatter,
    /// heartbeats and unknown kinds do not.
    pub fn is_job_activity(&self) -> bool {
        matches!(
            self,
            EventKind::PhaseChange | EventKind::ItemExamined | EventKind::Progress | EventKind::Step
        )
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        EventKind::parse(&raw)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage named by `phase_change` events.
///
/// Unknown names survive decoding as [`Phase::Other`]; whether a phase is
/// meaningful is decided by the tracker's configured phase list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    DataCollection,
    Exploration,
    Analysis,
    Generation,
    Error,
    Other(String),
}

impl Phase {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "data_collection" => Phase::DataCollection,
            "exploration" => Phase::Exploration,
            "analysis" => Phase::Analysis,
            "generation" => Phase::Generation,
            "error" => Phase::Error,
            other => Phase::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phase::DataCollection => "data_collection",
            Phase::Exploration => "exploration",
            Phase::Analysis => "analysis",
            Phase::Generation => "generation",
            Phase::Error => "error",
            Phase::Other(raw) => raw,
        }
    }

    /// Human-readable label used when a profile does not name the phase itself.
    pub fn label(&self) -> String {
        match self {
            Phase::DataCollection => "Data collection".to_string(),
            Phase::Exploration => "File exploration".to_string(),
            Phase::Analysis => "Analysis".to_string(),
            Phase::Generation => "Generation".to_string(),
            Phase::Error => "Error".to_string(),
            Phase::Other(raw) => raw.replace('_', " "),
        }
    }
}

impl From<String> for Phase {
    fn from(raw: String) -> Self {
        Phase::parse(&raw)
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value carried in the open `details` bag of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(value) => Some(*value),
            Scalar::Bool(_) | Scalar::Text(_) => None,
        }
    }
}

pub type Details = BTreeMap<String, Scalar>;

/// Kind-specific fields of an event. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub current_item: Option<String>,
    pub items_processed: Option<u64>,
    pub items_total: Option<u64>,
    /// Server-side percentage, 0 to 100.
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: Details,
}

/// One decoded message from the progress stream. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub session_id: Option<String>,
    pub phase: Option<Phase>,
    /// Timestamp asserted by the stream, not the local receipt time.
    pub occurred_at: Option<DateTime<Utc>>,
    pub payload: EventPayload,
}

impl ProgressEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            session_id: None,
            phase: None,
            occurred_at: None,
            payload: EventPayload::default(),
        }
    }

    /// Failure text of an `error` event: `error` wins over `message`.
    pub fn failure_message(&self) -> Option<&str> {
        self.payload
            .error
            .as_deref()
            .or(self.payload.message.as_deref())
    }

    /// True for events whose fields feed the metrics aggregator.
    pub fn carries_metrics(&self) -> bool {
        matches!(self.kind, EventKind::ItemExamined | EventKind::Progress)
            && (self.payload.items_processed.is_some()
                || self.payload.items_total.is_some()
                || self.payload.progress.is_some()
                || !self.payload.details.is_empty())
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::event::Phase;
use crate::event_log::{EventLog, LogEntry};
use crate::metrics::{MetricsAggregator, ProgressMetrics};
use crate::phase::{PhaseRecord, PhaseTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Active,
    Reconnecting { attempt: u32 },
    Completed,
    Errored,
    Closed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Errored | SessionStatus::Closed
        )
    }

    /// States in which the elapsed clock keeps running.
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The job itself reported an error.
    Job,
    /// The stream could not be kept open within the reconnect budget.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Internal counters; never surfaced as a job failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Telemetry {
    pub decode_failures: u64,
    pub foreign_events: u64,
    pub stale_events: u64,
    pub unclassified_events: u64,
    pub ignored_phase_changes: u64,
    pub connections_opened: u32,
}

/// Aggregate root for one monitored session. Only the controller that owns it
/// mutates it, and only through [`crate::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    config: SessionConfig,
    status: SessionStatus,
    failure: Option<Failure>,
    tracker: PhaseTracker,
    metrics: MetricsAggregator,
    log: EventLog,
    telemetry: Telemetry,
    started_at: DateTime<Utc>,
    reconnect_attempt: u32,
    dirty: bool,
}

impl SessionState {
    pub fn new(config: SessionConfig, started_at: DateTime<Utc>) -> Self {
        let tracker = PhaseTracker::new(&config.profile.phases);
        let metrics = MetricsAggregator::new(&config.profile.counter_keys);
        let log = EventLog::new(config.log_capacity);
        Self {
            config,
            status: SessionStatus::Connecting,
            failure: None,
            tracker,
            metrics,
            log,
            telemetry: Telemetry::default(),
            started_at,
            reconnect_attempt: 0,
            dirty: true,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    pub fn metrics(&self) -> &ProgressMetrics {
        self.metrics.metrics()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Immutable copy for readers; never reflects a half-applied message.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.config.session_id.clone(),
            profile: self.config.profile.name.clone(),
            status: self.status,
            failure: self.failure.clone(),
            current_phase: self.tracker.current().map(|record| record.id.clone()),
            phases: self.tracker.phases().to_vec(),
            metrics: self.metrics.metrics().clone(),
            log: self.log.entries(),
            telemetry: self.telemetry.clone(),
            started_at: self.started_at,
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn elapsed_ms(&self, at: DateTime<Utc>) -> u64 {
        (at - self.started_at).num_milliseconds().max(0) as u64
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            self.status = status;
            self.dirty = true;
        }
    }

    pub(crate) fn set_failure(&mut self, failure: Failure) {
        self.failure = Some(failure);
        self.dirty = true;
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut PhaseTracker {
        &mut self.tracker
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut MetricsAggregator {
        &mut self.metrics
    }

    pub(crate) fn log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }

    pub(crate) fn telemetry_mut(&mut self) -> &mut Telemetry {
        &mut self.telemetry
    }

    pub(crate) fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub(crate) fn set_reconnect_attempt(&mut self, attempt: u32) {
        self.reconnect_attempt = attempt;
    }

    /// A job-activity event proves the connection is doing useful work, which
    /// resets the consecutive-failure budget. An open that only delivers
    /// `connection` or `heartbeat` messages does not.
    pub(crate) fn note_job_activity(&mut self) {
        self.reconnect_attempt = 0;
    }

    pub(crate) fn note_transport_opened(&mut self) {
        self.telemetry.connections_opened += 1;
        self.dirty = true;
    }
}

/// What the presentation layer sees of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub profile: String,
    pub status: SessionStatus,
    pub failure: Option<Failure>,
    pub current_phase: Option<Phase>,
    pub phases: Vec<PhaseRecord>,
    pub metrics: ProgressMetrics,
    pub log: Vec<LogEntry>,
    pub telemetry: Telemetry,
    pub started_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

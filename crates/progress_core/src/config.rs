use std::time::Duration;

use crate::event::Phase;

pub const DEFAULT_LOG_CAPACITY: usize = 50;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_COMPLETION_GRACE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    pub id: Phase,
    pub name: String,
}

impl PhaseSpec {
    pub fn new(id: Phase, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl From<Phase> for PhaseSpec {
    fn from(id: Phase) -> Self {
        let name = id.label();
        Self { id, name }
    }
}

/// Per-job-type parameters: which phases exist, in order, and which detail
/// keys count as counters. An empty `counter_keys` accepts every numeric key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProfile {
    pub name: String,
    pub phases: Vec<PhaseSpec>,
    pub counter_keys: Vec<String>,
}

impl JobProfile {
    pub fn new(name: impl Into<String>, phases: impl IntoIterator<Item = PhaseSpec>) -> Self {
        Self {
            name: name.into(),
            phases: phases.into_iter().collect(),
            counter_keys: Vec::new(),
        }
    }

    pub fn with_counter_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counter_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Documentation/summary generation jobs.
    pub fn generation() -> Self {
        Self::new(
            "generation",
            [
                PhaseSpec::new(Phase::DataCollection, "Collecting data"),
                PhaseSpec::new(Phase::Exploration, "Exploring files"),
                PhaseSpec::new(Phase::Analysis, "Analyzing changes"),
                PhaseSpec::new(Phase::Generation, "Generating summary"),
            ],
        )
    }

    /// Project insight jobs.
    pub fn insights() -> Self {
        Self::new(
            "insights",
            [
                PhaseSpec::new(Phase::Exploration, "Exploring files"),
                PhaseSpec::new(Phase::Analysis, "Finding patterns"),
                PhaseSpec::new(Phase::Generation, "Writing insights"),
            ],
        )
        .with_counter_keys(["files_analyzed", "insights_found", "patterns_detected"])
    }

    /// Looks up one of the built-in profiles by name.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "generation" => Some(Self::generation()),
            "insights" => Some(Self::insights()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed wait between a drop and the next connection attempt.
    pub delay: Duration,
    /// Consecutive failed attempts tolerated before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub session_id: String,
    pub profile: JobProfile,
    pub log_capacity: usize,
    pub reconnect: ReconnectPolicy,
    /// Delay between a `complete` event and closing the transport.
    pub completion_grace: Duration,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>, profile: JobProfile) -> Self {
        Self {
            session_id: session_id.into(),
            profile,
            log_capacity: DEFAULT_LOG_CAPACITY,
            reconnect: ReconnectPolicy::default(),
            completion_grace: DEFAULT_COMPLETION_GRACE,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PhaseSpec;
use crate::event::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Current,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub id: Phase,
    pub name: String,
    pub status: PhaseStatus,
    /// Local receipt time of the transition into this phase. Phases that were
    /// skipped over never get one.
    pub entered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Advanced { from: Option<Phase>, to: Phase },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownPhase,
    AlreadyCurrent,
    AlreadyCompleted,
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackerState {
    Running,
    Completed,
    Errored { message: String },
}

/// Lifecycle of a job's phases over a fixed, ordered phase list.
///
/// Phases only ever move forward: a `phase_change` to phase *P* completes
/// everything declared before *P* and makes *P* current. `complete` and `fail`
/// are absorbing; after either, every further call is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTracker {
    phases: Vec<PhaseRecord>,
    state: TrackerState,
}

impl PhaseTracker {
    pub fn new(specs: &[PhaseSpec]) -> Self {
        let phases = specs
            .iter()
            .map(|spec| PhaseRecord {
                id: spec.id.clone(),
                name: spec.name.clone(),
                status: PhaseStatus::Pending,
                entered_at: None,
            })
            .collect();
        Self {
            phases,
            state: TrackerState::Running,
        }
    }

    pub fn advance_to(&mut self, phase: &Phase, at: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::Ignored(IgnoreReason::Frozen);
        }
        let Some(target) = self.phases.iter().position(|record| &record.id == phase) else {
            return Transition::Ignored(IgnoreReason::UnknownPhase);
        };
        match self.phases[target].status {
            PhaseStatus::Current => return Transition::Ignored(IgnoreReason::AlreadyCurrent),
            PhaseStatus::Completed => return Transition::Ignored(IgnoreReason::AlreadyCompleted),
            PhaseStatus::Pending => {}
        }

        let from = self.current().map(|record| record.id.clone());
        for record in &mut self.phases[..target] {
            record.status = PhaseStatus::Completed;
        }
        let record = &mut self.phases[target];
        record.status = PhaseStatus::Current;
        record.entered_at = Some(at);

        Transition::Advanced {
            from,
            to: phase.clone(),
        }
    }

    /// Marks every phase completed. Returns false if the tracker was already terminal.
    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        for record in &mut self.phases {
            record.status = PhaseStatus::Completed;
        }
        self.state = TrackerState::Completed;
        true
    }

    /// Freezes the tracker in its error state. Phase statuses are left as they
    /// were so the failing phase stays visible as current.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = TrackerState::Errored {
            message: message.into(),
        };
        true
    }

    pub fn current(&self) -> Option<&PhaseRecord> {
        self.phases
            .iter()
            .find(|record| record.status == PhaseStatus::Current)
    }

    pub fn phases(&self) -> &[PhaseRecord] {
        &self.phases
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, TrackerState::Running)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, TrackerState::Completed)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            TrackerState::Errored { message } => Some(message),
            TrackerState::Running | TrackerState::Completed => None,
        }
    }
}

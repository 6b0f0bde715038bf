//! Progress core: pure session model for streamed job-progress events.
mod config;
mod decode;
mod effect;
mod event;
mod event_log;
mod metrics;
mod msg;
mod phase;
mod session;
mod update;

pub use config::{
    JobProfile, PhaseSpec, ReconnectPolicy, SessionConfig, DEFAULT_COMPLETION_GRACE,
    DEFAULT_LOG_CAPACITY, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};
pub use decode::{decode_event, DecodeError};
pub use effect::Effect;
pub use event::{Details, EventKind, EventPayload, Phase, ProgressEvent, Scalar};
pub use event_log::{EventLog, LogEntry};
pub use metrics::{
    estimate_remaining, percentage_of, MetricsAggregator, MetricsOutcome, ProgressMetrics,
};
pub use msg::Msg;
pub use phase::{IgnoreReason, PhaseRecord, PhaseStatus, PhaseTracker, Transition};
pub use session::{
    Failure, FailureKind, SessionSnapshot, SessionState, SessionStatus, Telemetry,
};
pub use update::update;

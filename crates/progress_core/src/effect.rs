use std::time::Duration;

/// Work the controller must perform after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Drop the current transport, if any. Safe to repeat.
    CloseTransport,
    ScheduleReconnect { attempt: u32, delay: Duration },
    StartGraceTimer { delay: Duration },
    StopTicker,
}

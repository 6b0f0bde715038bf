use chrono::{DateTime, Utc};

/// Inputs to the session state machine. `at` is always the local clock at
/// the moment the controller observed the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// The transport delivered its open signal.
    TransportOpened { at: DateTime<Utc> },
    /// One complete message from the stream, still undecoded.
    MessageReceived { text: String, at: DateTime<Utc> },
    /// Connection refused, dropped, or ended by the peer.
    TransportLost { reason: String, at: DateTime<Utc> },
    /// No message at all arrived within the idle window.
    IdleTimeout { at: DateTime<Utc> },
    /// Periodic clock tick for the elapsed-time display.
    Tick { at: DateTime<Utc> },
    /// Post-completion grace period is over.
    GraceElapsed { at: DateTime<Utc> },
    /// Caller stopped monitoring.
    Cancel { at: DateTime<Utc> },
}

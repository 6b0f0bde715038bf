use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use progress_core::{
    update, Effect, FailureKind, JobProfile, Msg, Phase, PhaseStatus, ReconnectPolicy,
    SessionConfig, SessionState, SessionStatus,
};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

fn session_with(policy: ReconnectPolicy) -> SessionState {
    let mut config = SessionConfig::new("job-7", JobProfile::generation());
    config.reconnect = policy;
    SessionState::new(config, t(0))
}

fn message(state: SessionState, secs: i64, json: &str) -> (SessionState, Vec<Effect>) {
    update(
        state,
        Msg::MessageReceived {
            text: json.to_string(),
            at: t(secs),
        },
    )
}

fn lost(state: SessionState, secs: i64) -> (SessionState, Vec<Effect>) {
    update(
        state,
        Msg::TransportLost {
            reason: "connection reset".into(),
            at: t(secs),
        },
    )
}

#[test]
fn reconnect_preserves_accumulated_state() {
    let state = session_with(ReconnectPolicy::default());
    let (state, _) = update(state, Msg::TransportOpened { at: t(0) });
    let (state, _) = message(state, 1, r#"{"type":"phase_change","phase":"data_collection"}"#);
    let (state, _) = message(state, 2, r#"{"type":"phase_change","phase":"exploration"}"#);
    let (state, _) = message(
        state,
        3,
        r#"{"type":"progress","items_processed":3,"items_total":12}"#,
    );

    let (state, effects) = lost(state, 4);
    assert_eq!(state.status(), SessionStatus::Reconnecting { attempt: 1 });
    assert_eq!(
        effects,
        vec![
            Effect::CloseTransport,
            Effect::ScheduleReconnect {
                attempt: 1,
                delay: Duration::from_secs(3)
            }
        ]
    );

    let (state, _) = update(state, Msg::TransportOpened { at: t(7) });
    assert_eq!(state.status(), SessionStatus::Active);
    let (state, _) = message(state, 8, r#"{"type":"complete"}"#);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert!(snapshot
        .phases
        .iter()
        .all(|record| record.status == PhaseStatus::Completed));
    assert_eq!(snapshot.phases[0].entered_at, Some(t(1)));
    assert_eq!(snapshot.phases[1].entered_at, Some(t(2)));
    assert_eq!(snapshot.metrics.items_processed, 3);
    assert_eq!(snapshot.metrics.items_total, 12);
    assert_eq!(snapshot.metrics.percentage, 25);
    assert_eq!(snapshot.log.len(), 4);
    assert_eq!(snapshot.telemetry.connections_opened, 2);
}

#[test]
fn reconnect_attempts_are_bounded() {
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(100),
        max_attempts: Some(2),
    };
    let state = session_with(policy);
    let (state, effects) = lost(state, 1);
    assert!(matches!(effects[1], Effect::ScheduleReconnect { attempt: 1, .. }));
    let (state, effects) = lost(state, 2);
    assert!(matches!(effects[1], Effect::ScheduleReconnect { attempt: 2, .. }));

    let (state, effects) = lost(state, 3);
    assert_eq!(effects, vec![Effect::CloseTransport, Effect::StopTicker]);
    assert_eq!(state.status(), SessionStatus::Errored);
    let failure = state.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(failure.message.contains("gave up after 2 reconnect attempts"));
}

#[test]
fn budget_resets_once_a_reconnected_stream_delivers() {
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(100),
        max_attempts: Some(1),
    };
    let state = session_with(policy);
    let (state, _) = update(state, Msg::TransportOpened { at: t(0) });
    let (state, _) = lost(state, 1);
    let (state, _) = update(state, Msg::TransportOpened { at: t(2) });
    let (state, _) = message(state, 3, r#"{"type":"step","message":"scanning"}"#);

    let (state, effects) = lost(state, 4);
    assert_eq!(state.status(), SessionStatus::Reconnecting { attempt: 1 });
    assert!(matches!(effects[1], Effect::ScheduleReconnect { attempt: 1, .. }));
}

#[test]
fn an_open_without_messages_does_not_reset_the_budget() {
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(100),
        max_attempts: Some(1),
    };
    let state = session_with(policy);
    let (state, _) = lost(state, 1);
    let (state, _) = update(state, Msg::TransportOpened { at: t(2) });
    let (state, _) = lost(state, 3);
    assert_eq!(state.status(), SessionStatus::Errored);
}

#[test]
fn connection_chatter_does_not_reset_the_budget() {
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(100),
        max_attempts: Some(3),
    };
    let mut state = session_with(policy);
    let mut cycles = 0;
    while !state.is_terminal() && cycles < 100 {
        let secs = cycles * 10;
        state = update(state, Msg::TransportOpened { at: t(secs) }).0;
        state = message(state, secs + 1, r#"{"type":"connection"}"#).0;
        state = message(state, secs + 2, r#"{"type":"heartbeat"}"#).0;
        state = message(state, secs + 3, "not json").0;
        state = lost(state, secs + 4).0;
        cycles += 1;
    }

    assert_eq!(state.status(), SessionStatus::Errored);
    assert_eq!(cycles, 4);
    assert_eq!(state.telemetry().connections_opened, 4);
    let failure = state.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(failure.message.contains("gave up after 3 reconnect attempts"));
}

#[test]
fn unbounded_policy_keeps_retrying() {
    let policy = ReconnectPolicy {
        delay: Duration::from_secs(3),
        max_attempts: None,
    };
    let mut state = session_with(policy);
    for n in 1..=200 {
        state = lost(state, n).0;
    }
    assert_eq!(state.status(), SessionStatus::Reconnecting { attempt: 200 });
}

#[test]
fn cancel_closes_from_any_live_state_and_is_idempotent() {
    let state = session_with(ReconnectPolicy::default());
    let (state, _) = update(state, Msg::TransportOpened { at: t(0) });
    let (state, _) = message(state, 1, r#"{"type":"phase_change","phase":"analysis"}"#);

    let (state, effects) = update(state, Msg::Cancel { at: t(2) });
    assert_eq!(effects, vec![Effect::CloseTransport, Effect::StopTicker]);
    assert_eq!(state.status(), SessionStatus::Closed);

    let before = state.snapshot();
    let (state, effects) = update(state, Msg::Cancel { at: t(3) });
    assert!(effects.is_empty());
    let (state, _) = message(state, 4, r#"{"type":"phase_change","phase":"generation"}"#);
    assert_eq!(state.snapshot(), before);
    assert_eq!(
        before.current_phase,
        Some(Phase::Analysis),
        "closed session keeps its last known phase"
    );
}

#[test]
fn cancel_after_completion_keeps_outcome() {
    let state = session_with(ReconnectPolicy::default());
    let (state, _) = update(state, Msg::TransportOpened { at: t(0) });
    let (state, _) = message(state, 1, r#"{"type":"complete"}"#);
    let (state, effects) = update(state, Msg::Cancel { at: t(2) });
    assert_eq!(effects, vec![Effect::CloseTransport]);
    assert_eq!(state.status(), SessionStatus::Completed);
}

#[test]
fn idle_timeout_is_a_transport_drop_only_when_active() {
    let state = session_with(ReconnectPolicy::default());
    let (state, effects) = update(state, Msg::IdleTimeout { at: t(1) });
    assert!(effects.is_empty());
    assert_eq!(state.status(), SessionStatus::Connecting);

    let (state, _) = update(state, Msg::TransportOpened { at: t(2) });
    let (state, effects) = update(state, Msg::IdleTimeout { at: t(40) });
    assert_eq!(state.status(), SessionStatus::Reconnecting { attempt: 1 });
    assert_eq!(effects[0], Effect::CloseTransport);
}

#[test]
fn opening_after_terminal_state_closes_immediately() {
    let state = session_with(ReconnectPolicy::default());
    let (state, _) = update(state, Msg::Cancel { at: t(1) });
    let (state, effects) = update(state, Msg::TransportOpened { at: t(2) });
    assert_eq!(effects, vec![Effect::CloseTransport]);
    assert_eq!(state.status(), SessionStatus::Closed);
}

#[test]
fn grace_elapsed_is_noop_unless_completed() {
    let state = session_with(ReconnectPolicy::default());
    let before = state.clone();
    let (next, effects) = update(state, Msg::GraceElapsed { at: t(1) });
    assert!(effects.is_empty());
    assert_eq!(next, before);
}

use std::sync::Once;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use progress_core::{
    update, Effect, FailureKind, JobProfile, Msg, Phase, PhaseSpec, PhaseStatus, SessionConfig,
    SessionState, SessionStatus,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

fn new_session(profile: JobProfile) -> SessionState {
    SessionState::new(SessionConfig::new("job-1", profile), t(0))
}

fn open(state: SessionState, secs: i64) -> SessionState {
    update(state, Msg::TransportOpened { at: t(secs) }).0
}

fn send(state: SessionState, secs: i64, json: &str) -> (SessionState, Vec<Effect>) {
    update(
        state,
        Msg::MessageReceived {
            text: json.to_string(),
            at: t(secs),
        },
    )
}

fn feed(mut state: SessionState, messages: &[&str]) -> SessionState {
    for (index, json) in messages.iter().enumerate() {
        state = send(state, index as i64 + 1, json).0;
    }
    state
}

#[test]
fn new_session_is_connecting_and_dirty() {
    let mut state = new_session(JobProfile::generation());
    assert_eq!(state.status(), SessionStatus::Connecting);
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn transport_open_moves_to_active() {
    init_logging();
    let state = open(new_session(JobProfile::generation()), 1);
    assert_eq!(state.status(), SessionStatus::Active);
    assert_eq!(state.telemetry().connections_opened, 1);
    assert_eq!(state.metrics().elapsed_ms, 1_000);
}

#[test]
fn end_to_end_single_phase_session() {
    init_logging();
    let profile = JobProfile::new("explore-only", [PhaseSpec::from(Phase::Exploration)]);
    let state = open(new_session(profile), 0);

    let state = feed(
        state,
        &[
            r#"{"type":"phase_change","phase":"exploration"}"#,
            r#"{"type":"item_examined","current_item":"a.rs","items_processed":1,"items_total":10}"#,
            r#"{"type":"item_examined","current_item":"b.rs","items_processed":5,"items_total":10}"#,
            r#"{"type":"progress","progress":50}"#,
        ],
    );
    assert_eq!(state.tracker().phases()[0].status, PhaseStatus::Current);

    let (state, effects) = send(state, 5, r#"{"type":"complete"}"#);
    assert_eq!(
        effects,
        vec![
            Effect::StopTicker,
            Effect::StartGraceTimer {
                delay: Duration::from_millis(1500)
            }
        ]
    );

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.phases.len(), 1);
    assert_eq!(snapshot.phases[0].status, PhaseStatus::Completed);
    assert_eq!(snapshot.current_phase, None);
    assert_eq!(snapshot.metrics.items_processed, 5);
    assert_eq!(snapshot.metrics.items_total, 10);
    assert_eq!(snapshot.metrics.percentage, 50);
    assert_eq!(snapshot.metrics.estimated_remaining_ms, None);
    assert_eq!(snapshot.log.len(), 5);
}

#[test]
fn phase_entry_time_is_local_receipt_time() {
    let state = open(new_session(JobProfile::generation()), 0);
    let (state, _) = send(
        state,
        7,
        r#"{"type":"phase_change","phase":"analysis","timestamp":"1999-01-01T00:00:00Z"}"#,
    );
    let current = state.tracker().current().unwrap();
    assert_eq!(current.id, Phase::Analysis);
    assert_eq!(current.entered_at, Some(t(7)));
}

#[test]
fn error_event_is_terminal_and_freezes_state() {
    init_logging();
    let state = open(new_session(JobProfile::generation()), 0);
    let state = feed(state, &[r#"{"type":"phase_change","phase":"exploration"}"#]);

    let (state, effects) = send(state, 3, r#"{"type":"error","error":"model unavailable"}"#);
    assert_eq!(effects, vec![Effect::CloseTransport, Effect::StopTicker]);
    assert_eq!(state.status(), SessionStatus::Errored);
    let failure = state.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Job);
    assert_eq!(failure.message, "model unavailable");

    let before = state.snapshot();
    let (state, effects) = send(state, 4, r#"{"type":"phase_change","phase":"analysis"}"#);
    assert!(effects.is_empty());
    assert_eq!(state.snapshot(), before);

    // Transport trouble after a job failure never triggers a reconnect.
    let (state, effects) = update(
        state,
        Msg::TransportLost {
            reason: "reset".into(),
            at: t(5),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.snapshot(), before);
}

#[test]
fn decode_failures_are_counted_not_fatal() {
    init_logging();
    let state = open(new_session(JobProfile::generation()), 0);
    let state = feed(
        state,
        &[
            "not json",
            r#"{"type":"phase_change"}"#,
            r#"{"type":"phase_change","phase":"exploration"}"#,
        ],
    );
    assert_eq!(state.status(), SessionStatus::Active);
    assert_eq!(state.telemetry().decode_failures, 2);
    assert_eq!(state.log().len(), 1);
    assert_eq!(
        state.tracker().current().map(|record| record.id.clone()),
        Some(Phase::Exploration)
    );
}

#[test]
fn unclassified_events_only_reach_the_log() {
    let state = open(new_session(JobProfile::generation()), 0);
    let state = feed(
        state,
        &[r#"{"type":"cache_warmed","items_processed":9,"items_total":10}"#],
    );
    assert_eq!(state.log().len(), 1);
    assert_eq!(state.telemetry().unclassified_events, 1);
    assert_eq!(state.metrics().items_processed, 0);
    assert!(state.tracker().current().is_none());
}

#[test]
fn events_for_other_sessions_are_ignored() {
    let state = open(new_session(JobProfile::generation()), 0);
    let state = feed(
        state,
        &[
            r#"{"type":"phase_change","phase":"analysis","session_id":"job-2"}"#,
            r#"{"type":"phase_change","phase":"exploration","session_id":"job-1"}"#,
        ],
    );
    assert_eq!(state.telemetry().foreign_events, 1);
    assert_eq!(state.log().len(), 1);
    assert_eq!(
        state.tracker().current().map(|record| record.id.clone()),
        Some(Phase::Exploration)
    );
}

#[test]
fn ticks_advance_elapsed_only_while_live() {
    let state = open(new_session(JobProfile::generation()), 0);
    let (state, effects) = update(state, Msg::Tick { at: t(4) });
    assert!(effects.is_empty());
    assert_eq!(state.metrics().elapsed_ms, 4_000);

    let (state, _) = send(state, 5, r#"{"type":"complete"}"#);
    let (state, _) = update(state, Msg::Tick { at: t(30) });
    assert_eq!(state.metrics().elapsed_ms, 5_000);
}

#[test]
fn log_is_bounded_by_configured_capacity() {
    let mut config = SessionConfig::new("job-1", JobProfile::generation());
    config.log_capacity = 5;
    let mut state = update(SessionState::new(config, t(0)), Msg::TransportOpened { at: t(0) }).0;
    for n in 0..12 {
        state = send(
            state,
            n,
            &format!(r#"{{"type":"step","message":"step {n}"}}"#),
        )
        .0;
    }
    let messages: Vec<_> = state
        .log()
        .iter()
        .filter_map(|entry| entry.event.payload.message.clone())
        .collect();
    assert_eq!(
        messages,
        vec!["step 7", "step 8", "step 9", "step 10", "step 11"]
    );
}

#[test]
fn complete_then_grace_closes_transport() {
    let state = open(new_session(JobProfile::generation()), 0);
    let (state, _) = send(state, 1, r#"{"type":"complete"}"#);
    let (state, effects) = update(state, Msg::GraceElapsed { at: t(2) });
    assert_eq!(effects, vec![Effect::CloseTransport]);
    assert_eq!(state.status(), SessionStatus::Completed);
}

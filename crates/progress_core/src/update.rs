use chrono::{DateTime, Utc};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};

use crate::decode::decode_event;
use crate::event::{EventKind, ProgressEvent};
use crate::event_log::LogEntry;
use crate::metrics::MetricsOutcome;
use crate::phase::Transition;
use crate::session::{Failure, FailureKind, SessionState, SessionStatus};
use crate::{Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
///
/// Once the session is terminal every message is ignored, except that
/// `Cancel` and `GraceElapsed` may still ask for the transport to be closed.
/// Cancelling a `Completed` or `Errored` session closes the transport but
/// keeps that outcome as the status; only live sessions move to `Closed`.
pub fn update(mut state: SessionState, msg: Msg) -> (SessionState, Vec<Effect>) {
    let effects = match msg {
        Msg::TransportOpened { at } => {
            if state.is_terminal() {
                // A connect that raced a terminal transition.
                vec![Effect::CloseTransport]
            } else {
                monitor_info!(
                    session: state.session_id(),
                    "stream connected (connection #{})",
                    state.telemetry().connections_opened + 1
                );
                state.note_transport_opened();
                state.set_status(SessionStatus::Active);
                let elapsed = state.elapsed_ms(at);
                if state.metrics_mut().tick(elapsed) {
                    state.mark_dirty();
                }
                Vec::new()
            }
        }
        Msg::MessageReceived { text, at } => {
            if state.is_terminal() {
                return (state, Vec::new());
            }
            match decode_event(&text) {
                Ok(event) => apply_event(&mut state, event, at),
                Err(err) => {
                    state.telemetry_mut().decode_failures += 1;
                    state.mark_dirty();
                    monitor_warn!(session: state.session_id(), "dropping undecodable message: {}", err);
                    Vec::new()
                }
            }
        }
        Msg::TransportLost { reason, at } => lose_transport(&mut state, &reason, at),
        Msg::IdleTimeout { at } => {
            if state.status() == SessionStatus::Active {
                lose_transport(&mut state, "no messages within the idle timeout", at)
            } else {
                Vec::new()
            }
        }
        Msg::Tick { at } => {
            if state.status().is_live() {
                let elapsed = state.elapsed_ms(at);
                if state.metrics_mut().tick(elapsed) {
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::GraceElapsed { .. } => {
            if state.status() == SessionStatus::Completed {
                monitor_debug!(session: state.session_id(), "grace period over, closing stream");
                vec![Effect::CloseTransport]
            } else {
                Vec::new()
            }
        }
        Msg::Cancel { at } => match state.status() {
            SessionStatus::Closed => Vec::new(),
            SessionStatus::Completed | SessionStatus::Errored => vec![Effect::CloseTransport],
            SessionStatus::Connecting | SessionStatus::Active | SessionStatus::Reconnecting { .. } => {
                monitor_info!(session: state.session_id(), "monitoring cancelled");
                let elapsed = state.elapsed_ms(at);
                state.metrics_mut().finish(elapsed);
                state.set_status(SessionStatus::Closed);
                vec![Effect::CloseTransport, Effect::StopTicker]
            }
        },
    };

    (state, effects)
}

fn apply_event(state: &mut SessionState, event: ProgressEvent, at: DateTime<Utc>) -> Vec<Effect> {
    if let Some(other) = event.session_id.as_deref() {
        if other != state.session_id() {
            state.telemetry_mut().foreign_events += 1;
            state.mark_dirty();
            monitor_debug!(
                session: state.session_id(),
                "ignoring {} event for session {}",
                event.kind,
                other
            );
            return Vec::new();
        }
    }

    state.log_mut().push(LogEntry {
        received_at: at,
        event: event.clone(),
    });
    state.mark_dirty();
    if event.kind.is_job_activity() {
        state.note_job_activity();
    }

    match &event.kind {
        EventKind::Connection | EventKind::Heartbeat | EventKind::Step => Vec::new(),
        EventKind::Unclassified(kind) => {
            state.telemetry_mut().unclassified_events += 1;
            monitor_debug!(session: state.session_id(), "logged unclassified event kind {}", kind);
            Vec::new()
        }
        EventKind::PhaseChange => {
            // The decoder guarantees a phase on phase_change events.
            if let Some(phase) = &event.phase {
                match state.tracker_mut().advance_to(phase, at) {
                    Transition::Advanced { from, to } => {
                        let from = from.map_or_else(|| "start".to_string(), |p| p.to_string());
                        monitor_info!(session: state.session_id(), "phase {} -> {}", from, to);
                    }
                    Transition::Ignored(reason) => {
                        state.telemetry_mut().ignored_phase_changes += 1;
                        monitor_debug!(
                            session: state.session_id(),
                            "ignored phase_change to {}: {:?}",
                            phase,
                            reason
                        );
                    }
                }
            }
            Vec::new()
        }
        EventKind::ItemExamined | EventKind::Progress => {
            let elapsed = state.elapsed_ms(at);
            if state.metrics_mut().apply(&event, elapsed) == MetricsOutcome::Stale {
                state.telemetry_mut().stale_events += 1;
                monitor_debug!(session: state.session_id(), "stale {} event not applied", event.kind);
            }
            Vec::new()
        }
        EventKind::Complete => {
            let elapsed = state.elapsed_ms(at);
            state.tracker_mut().complete();
            state.metrics_mut().finish(elapsed);
            state.set_status(SessionStatus::Completed);
            monitor_info!(session: state.session_id(), "job completed after {} ms", elapsed);
            vec![
                Effect::StopTicker,
                Effect::StartGraceTimer {
                    delay: state.config().completion_grace,
                },
            ]
        }
        EventKind::Error => {
            let message = event
                .failure_message()
                .unwrap_or("job reported an error")
                .to_string();
            let elapsed = state.elapsed_ms(at);
            state.tracker_mut().fail(message.clone());
            state.metrics_mut().finish(elapsed);
            state.set_failure(Failure {
                kind: FailureKind::Job,
                message: message.clone(),
            });
            state.set_status(SessionStatus::Errored);
            monitor_warn!(session: state.session_id(), "job failed: {}", message);
            vec![Effect::CloseTransport, Effect::StopTicker]
        }
    }
}

fn lose_transport(state: &mut SessionState, reason: &str, at: DateTime<Utc>) -> Vec<Effect> {
    if state.is_terminal() {
        return Vec::new();
    }

    let attempt = state.reconnect_attempt() + 1;
    let policy = state.config().reconnect;
    if policy.max_attempts.is_some_and(|max| attempt > max) {
        let message = format!(
            "gave up after {} reconnect attempts: {}",
            attempt - 1,
            reason
        );
        monitor_warn!(session: state.session_id(), "{}", message);
        let elapsed = state.elapsed_ms(at);
        state.metrics_mut().finish(elapsed);
        state.set_failure(Failure {
            kind: FailureKind::Transport,
            message,
        });
        state.set_status(SessionStatus::Errored);
        return vec![Effect::CloseTransport, Effect::StopTicker];
    }

    monitor_warn!(
        session: state.session_id(),
        "stream lost ({}); reconnect attempt {} in {:?}",
        reason,
        attempt,
        policy.delay
    );
    state.set_reconnect_attempt(attempt);
    state.set_status(SessionStatus::Reconnecting { attempt });
    vec![
        Effect::CloseTransport,
        Effect::ScheduleReconnect {
            attempt,
            delay: policy.delay,
        },
    ]
}

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use monitor_logging::{monitor_debug, monitor_info};
use progress_core::{update, Effect, Msg, SessionSnapshot, SessionState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::settings::MonitorSettings;
use crate::transport::{MessageStream, Transport};

/// Timers owned by one session. They live and die with the session task.
#[derive(Debug)]
struct Timers {
    reconnect_at: Option<Instant>,
    grace_at: Option<Instant>,
    ticking: bool,
}

enum Wake {
    Cancelled,
    ReconnectDue,
    GraceElapsed,
    Frame(Option<Result<String, crate::TransportError>>),
    Idle,
    Tick,
}

/// Drives one session: owns its state, its transport and its timers, and
/// publishes a snapshot after every message that changed something.
pub(crate) struct SessionDriver {
    pub(crate) endpoint: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) settings: MonitorSettings,
    pub(crate) publisher: watch::Sender<Arc<SessionSnapshot>>,
    pub(crate) cancel: CancellationToken,
}

impl SessionDriver {
    pub(crate) async fn run(self, mut state: SessionState, predecessor: Option<JoinHandle<()>>) {
        if let Some(previous) = predecessor {
            // The replaced subscription must be fully gone before we connect.
            let _ = previous.await;
        }

        let session_id = state.session_id().to_string();
        // tokio's interval panics on a zero period.
        let tick_every = self.settings.tick_interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + tick_every, tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stream: Option<MessageStream> = None;
        let mut last_activity = Instant::now();
        let mut timers = Timers {
            reconnect_at: Some(Instant::now()),
            grace_at: None,
            ticking: true,
        };

        self.publish(&mut state);

        while !(state.is_terminal() && timers.grace_at.is_none()) {
            let idle_at = match (self.settings.idle_timeout, stream.is_some()) {
                (Some(timeout), true) if !state.is_terminal() => Some(last_activity + timeout),
                _ => None,
            };

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = sleep_until(timers.reconnect_at) => Wake::ReconnectDue,
                _ = sleep_until(timers.grace_at) => Wake::GraceElapsed,
                frame = next_frame(&mut stream) => Wake::Frame(frame),
                _ = sleep_until(idle_at) => Wake::Idle,
                _ = ticker.tick(), if timers.ticking => Wake::Tick,
            };

            let msg = match wake {
                Wake::Cancelled => {
                    timers.grace_at = None;
                    Msg::Cancel { at: self.now() }
                }
                Wake::ReconnectDue => {
                    timers.reconnect_at = None;
                    monitor_debug!(session: &session_id, "connecting to {}", self.endpoint);
                    let connected = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        result = self.transport.connect(&self.endpoint) => Some(result),
                    };
                    match connected {
                        None => Msg::Cancel { at: self.now() },
                        Some(Ok(opened)) => {
                            stream = Some(opened);
                            last_activity = Instant::now();
                            Msg::TransportOpened { at: self.now() }
                        }
                        Some(Err(err)) => Msg::TransportLost {
                            reason: err.to_string(),
                            at: self.now(),
                        },
                    }
                }
                Wake::GraceElapsed => {
                    timers.grace_at = None;
                    Msg::GraceElapsed { at: self.now() }
                }
                Wake::Frame(Some(Ok(text))) => {
                    last_activity = Instant::now();
                    Msg::MessageReceived {
                        text,
                        at: self.now(),
                    }
                }
                Wake::Frame(Some(Err(err))) => {
                    stream = None;
                    Msg::TransportLost {
                        reason: err.to_string(),
                        at: self.now(),
                    }
                }
                Wake::Frame(None) => {
                    stream = None;
                    Msg::TransportLost {
                        reason: "stream ended by server".to_string(),
                        at: self.now(),
                    }
                }
                Wake::Idle => {
                    last_activity = Instant::now();
                    Msg::IdleTimeout { at: self.now() }
                }
                Wake::Tick => Msg::Tick { at: self.now() },
            };

            let (next, effects) = update(state, msg);
            state = next;
            for effect in effects {
                apply_effect(effect, &mut stream, &mut timers);
            }
            self.publish(&mut state);
        }

        // Dropping the stream closes the connection; a second close is a no-op.
        drop(stream.take());
        monitor_info!(session: &session_id, "session finished as {:?}", state.status());
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        (self.settings.clock)()
    }

    fn publish(&self, state: &mut SessionState) {
        if state.consume_dirty() {
            self.publisher.send_replace(Arc::new(state.snapshot()));
        }
    }
}

fn apply_effect(effect: Effect, stream: &mut Option<MessageStream>, timers: &mut Timers) {
    match effect {
        Effect::CloseTransport => {
            stream.take();
        }
        Effect::ScheduleReconnect { delay, .. } => {
            timers.reconnect_at = Some(Instant::now() + delay);
        }
        Effect::StartGraceTimer { delay } => {
            timers.grace_at = Some(Instant::now() + delay);
        }
        Effect::StopTicker => timers.ticking = false,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    stream: &mut Option<MessageStream>,
) -> Option<Result<String, crate::TransportError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

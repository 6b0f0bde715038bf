#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::stream::{self, StreamExt};
use progress_core::{JobProfile, ReconnectPolicy, SessionConfig};
use progress_engine::{
    Clock, MessageStream, MonitorSettings, Transport, TransportError, TransportFailure,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

/// What the next `connect` call does.
pub enum Script {
    /// Open, deliver these messages, then end the stream.
    Deliver(Vec<String>),
    /// Open, deliver these messages, then stay open and silent.
    Hold(Vec<String>),
    Refuse,
}

pub fn deliver(messages: &[&str]) -> Script {
    Script::Deliver(messages.iter().map(|m| m.to_string()).collect())
}

pub fn hold(messages: &[&str]) -> Script {
    Script::Hold(messages.iter().map(|m| m.to_string()).collect())
}

/// In-memory transport that plays back one script per connection and keeps
/// track of how many streams are alive at once.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    live: Arc<AtomicUsize>,
    peak_live: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, _endpoint: &str) -> Result<MessageStream, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Refuse);
        let (messages, stay_open) = match script {
            Script::Deliver(messages) => (messages, false),
            Script::Hold(messages) => (messages, true),
            Script::Refuse => {
                return Err(TransportError::new(
                    TransportFailure::Refused,
                    "scripted refusal",
                ))
            }
        };

        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(now_live, Ordering::SeqCst);
        let guard = LiveGuard(self.live.clone());

        let items = stream::iter(messages.into_iter().map(Ok));
        let body = if stay_open {
            items.chain(stream::pending()).boxed()
        } else {
            items.boxed()
        };
        Ok(body
            .map(move |item| {
                let _alive = &guard;
                item
            })
            .boxed())
    }
}

/// Wall clock that follows tokio's (possibly paused) clock.
pub fn tokio_clock() -> Clock {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let start = tokio::time::Instant::now();
    Arc::new(move || base + chrono::Duration::from_std(start.elapsed()).unwrap())
}

pub fn settings() -> MonitorSettings {
    MonitorSettings {
        clock: tokio_clock(),
        ..MonitorSettings::default()
    }
}

pub fn config(session_id: &str) -> SessionConfig {
    let mut config = SessionConfig::new(session_id, JobProfile::generation());
    config.reconnect = ReconnectPolicy {
        delay: Duration::from_millis(100),
        max_attempts: Some(5),
    };
    config.completion_grace = Duration::from_millis(200);
    config
}

pub fn phase_change(phase: &str) -> String {
    format!(r#"{{"type":"phase_change","phase":"{phase}"}}"#)
}

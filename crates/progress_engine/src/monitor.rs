use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use monitor_logging::{monitor_debug, monitor_info};
use progress_core::{SessionConfig, SessionSnapshot, SessionState};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::controller::SessionDriver;
use crate::settings::MonitorSettings;
use crate::transport::{ReqwestSseTransport, Transport};
use crate::MonitorError;

/// Caller's reference to one monitoring session.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    session_id: String,
    generation: u64,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
    cancel: CancellationToken,
}

impl MonitorHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    /// Resolves once the session task has ended, with its final snapshot.
    pub async fn wait(&self) -> Arc<SessionSnapshot> {
        let mut snapshots = self.snapshots.clone();
        while snapshots.changed().await.is_ok() {}
        let last = snapshots.borrow().clone();
        last
    }
}

struct SessionEntry {
    generation: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionEntry>,
    next_generation: u64,
}

/// Entry point for the presentation layer: start, observe and stop sessions.
///
/// At most one live subscription exists per session id. Starting a session
/// that is already monitored cancels the old subscription, and the new one
/// waits for it to shut down before connecting.
pub struct Monitor {
    settings: MonitorSettings,
    transport: Arc<dyn Transport>,
    registry: Arc<Mutex<Registry>>,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        let transport = Arc::new(ReqwestSseTransport::new(settings.transport.clone()));
        Self::with_transport(settings, transport)
    }

    pub fn with_transport(settings: MonitorSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Starts monitoring `endpoint` on the current tokio runtime.
    pub fn start_monitoring(
        &self,
        endpoint: &str,
        config: SessionConfig,
    ) -> Result<MonitorHandle, MonitorError> {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        url::Url::parse(endpoint).map_err(|err| MonitorError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        })?;

        let session_id = config.session_id.clone();
        let state = SessionState::new(config, (self.settings.clock)());
        let (publisher, snapshots) = watch::channel(Arc::new(state.snapshot()));
        let cancel = CancellationToken::new();

        let mut registry = lock(&self.registry);
        registry.next_generation += 1;
        let generation = registry.next_generation;

        let predecessor = registry.sessions.remove(&session_id).and_then(|previous| {
            monitor_info!(session: &session_id, "replacing existing subscription");
            previous.cancel.cancel();
            previous.task
        });

        let driver = SessionDriver {
            endpoint: endpoint.to_string(),
            transport: self.transport.clone(),
            settings: self.settings.clone(),
            publisher,
            cancel: cancel.clone(),
        };
        let registry_ref = Arc::clone(&self.registry);
        let release_id = session_id.clone();
        let task = runtime.spawn(async move {
            driver.run(state, predecessor).await;
            release(&registry_ref, &release_id, generation);
        });

        registry.sessions.insert(
            session_id.clone(),
            SessionEntry {
                generation,
                cancel: cancel.clone(),
                task: Some(task),
                snapshots: snapshots.clone(),
            },
        );
        monitor_info!(session: &session_id, "monitoring {}", endpoint);

        Ok(MonitorHandle {
            session_id,
            generation,
            snapshots,
            cancel,
        })
    }

    /// Stops a session. Stopping twice, or stopping a session that already
    /// ended or was replaced, does nothing.
    pub fn stop_monitoring(&self, handle: &MonitorHandle) {
        if handle.cancel.is_cancelled() {
            return;
        }
        monitor_debug!(
            session: handle.session_id(),
            "stop requested (generation {})",
            handle.generation
        );
        handle.cancel.cancel();
    }

    /// Stops whichever session currently runs under `session_id`, if any.
    pub fn stop_session(&self, session_id: &str) {
        if let Some(entry) = lock(&self.registry).sessions.get(session_id) {
            entry.cancel.cancel();
        }
    }

    /// Invokes `callback` with every snapshot the session publishes, starting
    /// with the current one, until the session task ends.
    pub fn on_state_change<F>(&self, handle: &MonitorHandle, mut callback: F) -> Option<JoinHandle<()>>
    where
        F: FnMut(&SessionSnapshot) + Send + 'static,
    {
        let runtime = Handle::try_current().ok()?;
        let mut snapshots = handle.subscribe();
        Some(runtime.spawn(async move {
            let first = snapshots.borrow_and_update().clone();
            callback(&first);
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                callback(&snapshot);
            }
        }))
    }

    /// Latest snapshot of the session currently running under `session_id`.
    pub fn snapshot(&self, session_id: &str) -> Option<Arc<SessionSnapshot>> {
        lock(&self.registry)
            .sessions
            .get(session_id)
            .map(|entry| entry.snapshots.borrow().clone())
    }

    /// Ids of sessions whose task has not ended yet, sorted.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.registry).sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        for entry in lock(&self.registry).sessions.values() {
            entry.cancel.cancel();
        }
    }
}

fn release(registry: &Mutex<Registry>, session_id: &str, generation: u64) {
    let mut registry = lock(registry);
    if registry
        .sessions
        .get(session_id)
        .is_some_and(|entry| entry.generation == generation)
    {
        registry.sessions.remove(session_id);
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

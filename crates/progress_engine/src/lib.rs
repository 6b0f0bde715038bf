//! Progress engine: event-stream transport and per-session lifecycle control.
mod controller;
mod monitor;
mod settings;
mod sse;
mod transport;
mod types;

pub use monitor::{Monitor, MonitorHandle};
pub use settings::{load_settings, Clock, MonitorSettings, SettingsError, SettingsFile};
pub use sse::SseDecoder;
pub use transport::{MessageStream, ReqwestSseTransport, Transport, TransportSettings};
pub use types::{MonitorError, TransportError, TransportFailure};

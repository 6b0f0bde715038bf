use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportFailure,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    InvalidUrl,
    HttpStatus(u16),
    UnsupportedContentType { content_type: String },
    Timeout,
    Refused,
    Network,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::InvalidUrl => write!(f, "invalid url"),
            TransportFailure::HttpStatus(code) => write!(f, "http status {code}"),
            TransportFailure::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            TransportFailure::Timeout => write!(f, "timeout"),
            TransportFailure::Refused => write!(f, "connection refused"),
            TransportFailure::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitoring requires a running tokio runtime")]
    NoRuntime,
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
}

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};

use crate::sse::SseDecoder;
use crate::{TransportError, TransportFailure};

/// Raw message texts from one open connection. The stream ending, or yielding
/// an error, means the connection is gone.
pub type MessageStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens one long-lived subscription to a progress endpoint.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<MessageStream, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub allowed_content_types: Vec<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            allowed_content_types: vec!["text/event-stream".to_string()],
        }
    }
}

/// Server-sent events over a single HTTP GET.
///
/// No overall request timeout is set: the response body is expected to stay
/// open for the life of the job.
#[derive(Debug, Clone)]
pub struct ReqwestSseTransport {
    settings: TransportSettings,
}

impl ReqwestSseTransport {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .build()
            .map_err(|err| TransportError::new(TransportFailure::Network, err.to_string()))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestSseTransport {
    async fn connect(&self, endpoint: &str) -> Result<MessageStream, TransportError> {
        let parsed = reqwest::Url::parse(endpoint)
            .map_err(|err| TransportError::new(TransportFailure::InvalidUrl, err.to_string()))?;
        let client = self.build_client()?;

        let response = client
            .get(parsed)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                TransportFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(ct) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            if !self.is_content_type_allowed(ct) {
                return Err(TransportError::new(
                    TransportFailure::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "endpoint is not an event stream",
                ));
            }
        }

        Ok(frame_messages(response.bytes_stream().boxed()))
    }
}

struct FrameState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

fn frame_messages(body: BoxStream<'static, reqwest::Result<Bytes>>) -> MessageStream {
    let state = FrameState {
        body,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(message) = state.ready.pop_front() {
                return Some((Ok(message), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.decoder.feed(&chunk)),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(map_reqwest_error(err)), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(TransportFailure::Timeout, err.to_string());
    }
    if err.is_connect() {
        return TransportError::new(TransportFailure::Refused, err.to_string());
    }
    TransportError::new(TransportFailure::Network, err.to_string())
}

// ── Push-stream transport ──
//
// A transport opens one long-lived server-to-client stream and yields raw
// frames until it fails or the server ends it. Dropping the stream closes
// the underlying connection. Reconnect policy lives in the state machine,
// never in the transport.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use reqwest_eventsource::{Event, EventSource, retry};
use url::Url;

use crate::error::StreamError;
use crate::frame::RawFrame;

/// Frames from one open stream. `None` means the server ended the stream.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<RawFrame, StreamError>> + Send>>;

/// Opens push streams. Implemented by [`SseTransport`] for production and by
/// in-memory doubles in tests.
pub trait Transport: Send + Sync {
    /// Open a stream to `endpoint`.
    ///
    /// Construction problems (bad scheme, unbuildable request) fail here;
    /// network and HTTP failures arrive later as stream items.
    fn open(&self, endpoint: &Url) -> Result<FrameStream, StreamError>;
}

// ── SseTransport ─────────────────────────────────────────────────────

/// Server-Sent Events over HTTP via `reqwest-eventsource`.
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, headers).
    ///
    /// Avoid a whole-request timeout on this client: the stream is meant to
    /// stay open indefinitely.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for SseTransport {
    fn open(&self, endpoint: &Url) -> Result<FrameStream, StreamError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StreamError::Open(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }

        // EventSource adds `Accept: text/event-stream` itself.
        let request = self.http.get(endpoint.clone());
        let mut source = EventSource::new(request).map_err(|e| StreamError::Open(e.to_string()))?;
        source.set_retry_policy(Box::new(retry::Never));

        tracing::debug!(url = %endpoint, "opening explorer event stream");

        let frames = source.filter_map(|item| async move {
            match item {
                Ok(Event::Open) => {
                    tracing::trace!("event stream response received");
                    None
                }
                Ok(Event::Message(msg)) => Some(Ok(RawFrame {
                    event: msg.event,
                    data: msg.data,
                })),
                Err(e) => Some(Err(map_sse_error(e))),
            }
        });

        Ok(Box::pin(frames))
    }
}

fn map_sse_error(err: reqwest_eventsource::Error) -> StreamError {
    match err {
        reqwest_eventsource::Error::StreamEnded => StreamError::Closed,
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => StreamError::HttpStatus {
            status: status.as_u16(),
        },
        reqwest_eventsource::Error::InvalidContentType(value, _) => StreamError::ContentType(
            value.to_str().unwrap_or("<non-ascii>").to_owned(),
        ),
        other => StreamError::Transport(other.to_string()),
    }
}

// ── Scripted transport for tests ─────────────────────────────────────

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `explorer-stream` crate.
///
/// Only [`StreamClient::connect`](crate::StreamClient::connect) hands these
/// back to a caller. Failures that happen in the background (drops, retry
/// timeouts) are reported as [`Notification::Error`](crate::Notification::Error)
/// with the error's display text.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Construction ────────────────────────────────────────────────
    /// Base URL or events path could not be turned into an endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The transport could not be built (HTTP client, request, scheme).
    #[error("Could not open event stream: {0}")]
    Open(String),

    // ── Transport ───────────────────────────────────────────────────
    /// Network-level failure while the stream was open or opening.
    #[error("Event stream transport error: {0}")]
    Transport(String),

    /// The server answered the stream request with a non-success status.
    #[error("Event stream rejected (HTTP {status})")]
    HttpStatus { status: u16 },

    /// The server answered with something other than `text/event-stream`.
    #[error("Unexpected content type: {0}")]
    ContentType(String),

    /// The server ended the stream.
    #[error("Event stream closed by server")]
    Closed,

    // ── Lifecycle ───────────────────────────────────────────────────
    /// No `connected` frame arrived within the connect timeout.
    #[error("No acknowledgement from server after {}ms", .timeout.as_millis())]
    ConnectTimeout { timeout: Duration },

    /// A `disconnect()` or a newer `connect()` ended this connect cycle
    /// before it settled.
    #[error("Connect superseded by a newer connect or disconnect")]
    Superseded,
}

impl StreamError {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Closed | Self::ConnectTimeout { .. } => true,
            Self::HttpStatus { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Error returned by a subscriber handler.
///
/// Logged by the dispatcher and otherwise ignored: one failing handler
/// never stops delivery to the next.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

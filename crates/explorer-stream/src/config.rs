// ── Runtime stream configuration ──
//
// Describes *where* the explorer event stream lives and *how* the client
// reacts to drops and bursts. Never touches disk: the embedding app (or the
// explorer-stream-config crate) builds a `StreamConfig` and hands it in.

use std::time::Duration;

/// Path of the explorer event stream relative to the server base URL.
pub const DEFAULT_EVENTS_PATH: &str = "/api/explorer/events";

/// Longest wait any client timer honours. Longer settings are clamped.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for a single [`StreamClient`](crate::StreamClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Server base URL (e.g. `http://127.0.0.1:8080`). Parsed on `connect()`.
    pub base_url: String,
    /// Stream path appended to `base_url`.
    pub events_path: String,
    /// Schedule reconnects after a drop while connected.
    pub auto_reconnect: bool,
    /// Failed retries tolerated before `reconnect_failed` is emitted.
    pub max_reconnect_attempts: u32,
    /// Delay before the first retry.
    pub initial_reconnect_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_reconnect_delay: Duration,
    /// Quiet period per coalescing key.
    pub event_debounce: Duration,
    /// Bound on the time between opening the stream and the `connected` ack.
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            events_path: DEFAULT_EVENTS_PATH.into(),
            auto_reconnect: true,
            max_reconnect_attempts: 10,
            initial_reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_millis(30_000),
            event_debounce: Duration::from_millis(300),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// Default configuration pointed at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Resolve the full stream endpoint from `base_url` + `events_path`.
    ///
    /// A base with a path prefix (`http://host/app`) keeps the prefix.
    pub fn endpoint(&self) -> Result<url::Url, url::ParseError> {
        let mut base = url::Url::parse(&self.base_url)?;
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(self.events_path.trim_start_matches('/'))
    }
}

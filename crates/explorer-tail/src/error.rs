//! CLI error types with miette diagnostics.
//!
//! Maps stream and config failures into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use explorer_stream::StreamError;
use explorer_stream_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not open the event stream at {url}")]
    #[diagnostic(
        code(explorer_tail::connection_failed),
        help(
            "Check that the server is running and serves text/event-stream.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: StreamError,
    },

    #[error("Server did not acknowledge the stream within {millis}ms")]
    #[diagnostic(
        code(explorer_tail::timeout),
        help("Raise connect_timeout_ms in the config or check server responsiveness.")
    )]
    Timeout { millis: u128 },

    #[error("Event stream at {url} closed")]
    #[diagnostic(
        code(explorer_tail::stream_lost),
        help("Reconnects are off (--no-reconnect). Drop the flag to keep watching.")
    )]
    StreamLost { url: String },

    #[error("Gave up reconnecting after {attempts} attempts")]
    #[diagnostic(
        code(explorer_tail::reconnect_failed),
        help("Raise max_reconnect_attempts, or rerun once the server is back.")
    )]
    ReconnectFailed { attempts: u32 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(explorer_tail::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(explorer_tail::profile_not_found),
        help("Define it under [profiles.{name}] in the config file, or pass --url.")
    )]
    ProfileNotFound { name: String },

    #[error(transparent)]
    #[diagnostic(code(explorer_tail::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode notification: {0}")]
    #[diagnostic(code(explorer_tail::json))]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound { name: profile },
            other @ ConfigError::Figment(_) => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Classify a failed `connect()` against `url`.
    pub fn from_stream(err: StreamError, url: &str) -> Self {
        match err {
            StreamError::ConnectTimeout { timeout } => Self::Timeout {
                millis: timeout.as_millis(),
            },
            StreamError::InvalidUrl(e) => Self::Validation {
                field: "url".into(),
                reason: e.to_string(),
            },
            source => Self::ConnectionFailed {
                url: url.into(),
                source,
            },
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. }
            | Self::StreamLost { .. }
            | Self::ReconnectFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

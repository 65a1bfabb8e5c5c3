// ── Notification types ──
//
// Everything a subscriber can observe. Event kinds form a closed set; each
// notification variant carries its own statically shaped payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

// ── Domain payloads ──────────────────────────────────────────────────

/// Kind of filesystem change reported by the server-side watcher.
///
/// Kinds this client does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
    Other(String),
}

impl From<String> for ChangeType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "created" => Self::Created,
            "modified" => Self::Modified,
            "deleted" => Self::Deleted,
            "renamed" => Self::Renamed,
            _ => Self::Other(value),
        }
    }
}

impl From<ChangeType> for String {
    fn from(value: ChangeType) -> Self {
        match value {
            ChangeType::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

impl ChangeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `file_change` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(rename = "type")]
    pub change: ChangeType,
    /// Any further fields the server attaches (size, mtime, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, change: ChangeType) -> Self {
        Self {
            path: path.into(),
            change,
            extra: serde_json::Map::new(),
        }
    }
}

/// Watcher key used when a `structure_update` frame names none.
pub const DEFAULT_WATCHER_KEY: &str = "default";

/// Payload of a `structure_update` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watcher_key: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StructureUpdate {
    /// The watcher this update refers to, falling back to the default one.
    pub fn watcher(&self) -> &str {
        self.watcher_key.as_deref().unwrap_or(DEFAULT_WATCHER_KEY)
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// Why the client left the connected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DisconnectReason {
    /// `disconnect()` or `reconnect()` was called.
    Manual,
    /// The transport failed or the server closed the stream.
    Error,
}

/// Closed set of subscribable event kinds.
///
/// Parses from and displays as the wire name (`"file_change"`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    StateChange,
    Connected,
    Message,
    FileChange,
    StructureUpdate,
    Disconnected,
    Error,
    ReconnectFailed,
    Unknown,
}

/// A notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    StateChange {
        state: ConnectionState,
    },
    Connected {
        server_info: serde_json::Value,
    },
    Message {
        data: serde_json::Value,
    },
    FileChange(FileChange),
    StructureUpdate(StructureUpdate),
    Disconnected {
        reason: DisconnectReason,
    },
    Error {
        detail: String,
    },
    ReconnectFailed {
        attempts: u32,
    },
    /// A named frame this client has no schema for.
    Unknown {
        name: String,
        data: String,
    },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChange { .. } => EventKind::StateChange,
            Self::Connected { .. } => EventKind::Connected,
            Self::Message { .. } => EventKind::Message,
            Self::FileChange(_) => EventKind::FileChange,
            Self::StructureUpdate(_) => EventKind::StructureUpdate,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Error { .. } => EventKind::Error,
            Self::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }
}

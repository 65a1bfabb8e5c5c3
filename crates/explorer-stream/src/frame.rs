// ── Frame classification ──
//
// Raw frames carry an event name and a text body. Classification turns them
// into control frames (the `connected` ack), generic messages, coalescable
// domain events, or explicitly unknown frames.

use serde::de::DeserializeOwned;

use crate::event::{ChangeType, FileChange, StructureUpdate};

/// Frame name of the open-ack control frame.
pub const CONNECTED: &str = "connected";
/// Frame name of filesystem change notifications.
pub const FILE_CHANGE: &str = "file_change";
/// Frame name of directory-structure refresh hints.
pub const STRUCTURE_UPDATE: &str = "structure_update";
/// Name the SSE wire format assigns to frames without an `event:` line.
pub const DEFAULT_MESSAGE: &str = "message";

/// One frame as delivered by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Event name; empty or `"message"` for unnamed frames.
    pub event: String,
    /// Frame body (JSON text for every frame this client understands).
    pub data: String,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// A classified frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Open-ack carrying opaque server info.
    Connected(serde_json::Value),
    /// Unnamed frame with a generic JSON payload.
    Message(serde_json::Value),
    /// Coalescable domain event.
    Domain(DomainEvent),
    /// Named frame with no known schema.
    Unknown { name: String, data: String },
}

/// Domain events routed through the coalescer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    FileChange(FileChange),
    StructureUpdate(StructureUpdate),
}

/// Composite coalescing identity: event kind plus its discriminating fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
    FileChange { path: String, change: ChangeType },
    StructureUpdate { watcher_key: String },
}

impl DomainEvent {
    pub fn coalesce_key(&self) -> CoalesceKey {
        match self {
            Self::FileChange(change) => CoalesceKey::FileChange {
                path: change.path.clone(),
                change: change.change.clone(),
            },
            Self::StructureUpdate(update) => CoalesceKey::StructureUpdate {
                watcher_key: update.watcher().to_owned(),
            },
        }
    }
}

/// A frame whose body did not match its schema.
#[derive(Debug, thiserror::Error)]
#[error("malformed '{event}' frame: {source}")]
pub struct MalformedFrame {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

/// Classify a raw frame. Malformed bodies are reported, never fatal.
pub fn classify(raw: &RawFrame) -> Result<Frame, MalformedFrame> {
    match raw.event.as_str() {
        CONNECTED => parse_opaque(raw).map(Frame::Connected),
        "" | DEFAULT_MESSAGE => parse(raw).map(Frame::Message),
        FILE_CHANGE => parse(raw).map(|c| Frame::Domain(DomainEvent::FileChange(c))),
        STRUCTURE_UPDATE => {
            parse_opaque_or_empty(raw).map(|u| Frame::Domain(DomainEvent::StructureUpdate(u)))
        }
        name => Ok(Frame::Unknown {
            name: name.to_owned(),
            data: raw.data.clone(),
        }),
    }
}

fn parse<T: DeserializeOwned>(raw: &RawFrame) -> Result<T, MalformedFrame> {
    serde_json::from_str(&raw.data).map_err(|source| MalformedFrame {
        event: raw.event.clone(),
        source,
    })
}

/// The ack body is informational; an empty body is an empty object.
fn parse_opaque(raw: &RawFrame) -> Result<serde_json::Value, MalformedFrame> {
    if raw.data.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    parse(raw)
}

/// `structure_update` may arrive with no body at all (default watcher).
fn parse_opaque_or_empty(raw: &RawFrame) -> Result<StructureUpdate, MalformedFrame> {
    if raw.data.trim().is_empty() {
        return Ok(StructureUpdate::default());
    }
    parse(raw)
}

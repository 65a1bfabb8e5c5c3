// explorer-stream: Resilient client for the file-explorer push event stream

//! Keeps a file-explorer view in sync with server-side filesystem changes.
//!
//! [`StreamClient`] opens a long-lived server-to-client stream, reconnects
//! with capped exponential backoff when it drops, collapses bursts of
//! same-key domain events into one delivery, and dispatches typed
//! [`Notification`]s to subscribers registered per [`EventKind`].

pub mod backoff;
pub mod client;
pub mod coalesce;
pub mod config;
mod dispatch;
pub mod error;
pub mod event;
pub mod frame;
mod machine;
pub mod registry;
pub mod transport;

pub use client::StreamClient;
pub use config::{MAX_WAIT, StreamConfig};
pub use error::{HandlerError, StreamError};
pub use event::{
    ChangeType, ConnectionState, DisconnectReason, EventKind, FileChange, Notification,
    StructureUpdate,
};
pub use registry::SubscriptionId;
pub use transport::{FrameStream, SseTransport, Transport};

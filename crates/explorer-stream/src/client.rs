// ── StreamClient facade ──
//
// Connect, disconnect, reconnect, subscribe. Each `connect()` starts a new
// cycle: a fresh epoch, a fresh `ConnectionMachine` task, and a fresh
// transport stream. Ending a cycle cancels its task, which drops the stream,
// its timers, and its coalescer in one step.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::StreamConfig;
use crate::dispatch::Dispatcher;
use crate::error::{HandlerError, StreamError};
use crate::event::{ConnectionState, DisconnectReason, EventKind, Notification};
use crate::machine::ConnectionMachine;
use crate::registry::{self, SubscriptionId};
use crate::transport::{FrameStream, SseTransport, Transport};

// ── Shared state ─────────────────────────────────────────────────────

struct Cycle {
    epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Cycle {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

struct Lifecycle {
    state: ConnectionState,
    cycle: Option<Cycle>,
    config: StreamConfig,
}

/// State shared between the facade and the running machine.
pub(crate) struct Shared {
    dispatcher: Dispatcher,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.dispatcher.is_current(epoch)
    }

    /// Move to `state` on behalf of cycle `epoch` and announce it.
    ///
    /// Stale cycles and no-op transitions change nothing.
    pub(crate) fn transition(&self, epoch: u64, state: ConnectionState) {
        {
            let mut life = self.lock();
            if !self.dispatcher.is_current(epoch) || life.state == state {
                return;
            }
            life.state = state;
        }
        tracing::debug!(%state, epoch, "connection state changed");
        self.dispatcher
            .emit(epoch, &Notification::StateChange { state });
    }

    pub(crate) fn emit(&self, epoch: u64, notification: &Notification) {
        self.dispatcher.emit(epoch, notification);
    }

    /// Forget a cycle whose machine ran out of work.
    pub(crate) fn finish_cycle(&self, epoch: u64) {
        let mut life = self.lock();
        if life.cycle.as_ref().is_some_and(|c| c.epoch == epoch) {
            life.cycle = None;
        }
    }
}

// ── StreamClient ─────────────────────────────────────────────────────

/// Resilient client for the explorer event stream.
///
/// Cheaply cloneable; clones share one connection and one set of
/// subscribers. Construct one per server.
///
/// ```rust,ignore
/// use explorer_stream::{EventKind, Notification, StreamClient, StreamConfig};
///
/// let client = StreamClient::new(StreamConfig::with_base_url("http://127.0.0.1:8080"));
/// client.subscribe(EventKind::FileChange, |n| {
///     if let Notification::FileChange(change) = n {
///         println!("{} {}", change.change, change.path);
///     }
///     Ok(())
/// });
/// let server_info = client.connect().await?;
/// ```
#[derive(Clone)]
pub struct StreamClient {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let life = self.shared.lock();
        f.debug_struct("StreamClient")
            .field("state", &life.state)
            .field("base_url", &life.config.base_url)
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Client speaking Server-Sent Events over HTTP.
    pub fn new(config: StreamConfig) -> Self {
        Self::with_transport(config, Arc::new(SseTransport::new()))
    }

    /// Client using a custom transport.
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher: Dispatcher::new(),
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectionState::Disconnected,
                    cycle: None,
                    config,
                }),
            }),
            transport,
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the stream and wait for the server's `connected` ack.
    ///
    /// Resolves to the ack's server-info payload. Any existing connection
    /// is torn down first. Fails on an invalid endpoint, a transport error
    /// before the ack, the connect timeout, or when a later `connect()` /
    /// `disconnect()` supersedes this one. A failed `connect()` does not
    /// schedule reconnects.
    pub async fn connect(&self) -> Result<serde_json::Value, StreamError> {
        let (epoch, config, previous) = {
            let mut life = self.shared.lock();
            let previous = life.cycle.take();
            let epoch = self.shared.dispatcher.advance_epoch();
            (epoch, life.config.clone(), previous)
        };
        if let Some(previous) = previous {
            tracing::debug!(epoch = previous.epoch, "tearing down previous connection");
            previous.stop();
        }
        self.shared.dispatcher.barrier();

        self.shared.transition(epoch, ConnectionState::Connecting);
        if !self.shared.is_current(epoch) {
            return Err(StreamError::Superseded);
        }

        let (frames, endpoint) = match self.open(&config) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(error = %e, base_url = %config.base_url, "cannot open event stream");
                self.shared.emit(
                    epoch,
                    &Notification::Error {
                        detail: e.to_string(),
                    },
                );
                self.shared.transition(epoch, ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let machine = ConnectionMachine::new(
            Arc::clone(&self.shared),
            epoch,
            config,
            Arc::clone(&self.transport),
            endpoint,
            frames,
            ack_tx,
        );
        let task = tokio::spawn(machine.run(cancel.clone()));
        let cycle = Cycle {
            epoch,
            cancel,
            task,
        };

        {
            let mut life = self.shared.lock();
            if self.shared.is_current(epoch) {
                life.cycle = Some(cycle);
            } else {
                drop(life);
                cycle.stop();
            }
        }

        ack_rx.await.unwrap_or(Err(StreamError::Superseded))
    }

    fn open(&self, config: &StreamConfig) -> Result<(FrameStream, Url), StreamError> {
        let endpoint = config.endpoint()?;
        let frames = self.transport.open(&endpoint)?;
        Ok((frames, endpoint))
    }

    /// Close the stream and cancel every pending timer.
    ///
    /// Synchronous and idempotent. Pending coalesced events are discarded.
    /// Once this returns no notification from the closed connection is
    /// delivered, even one that was mid-dispatch on another thread.
    pub fn disconnect(&self) {
        let (epoch, cycle, previous) = {
            let mut life = self.shared.lock();
            let cycle = life.cycle.take();
            let epoch = self.shared.dispatcher.advance_epoch();
            let previous = std::mem::replace(&mut life.state, ConnectionState::Disconnected);
            (epoch, cycle, previous)
        };
        if let Some(cycle) = cycle {
            cycle.stop();
        }
        self.shared.dispatcher.barrier();

        if previous != ConnectionState::Disconnected {
            self.shared.emit(
                epoch,
                &Notification::StateChange {
                    state: ConnectionState::Disconnected,
                },
            );
        }
        self.shared.emit(
            epoch,
            &Notification::Disconnected {
                reason: DisconnectReason::Manual,
            },
        );
        tracing::info!("explorer event stream disconnected");
    }

    /// `disconnect()` followed by `connect()`.
    pub async fn reconnect(&self) -> Result<serde_json::Value, StreamError> {
        self.disconnect();
        self.connect().await
    }

    /// Point the client at another server. Takes effect on the next
    /// `connect()` or `reconnect()`.
    pub fn set_base_url(&self, base_url: impl Into<String>) {
        self.shared.lock().config.base_url = base_url.into();
    }

    // ── Subscribers ──────────────────────────────────────────────────

    /// Register `handler` for notifications of `kind`.
    ///
    /// Handlers run synchronously on the thread delivering the
    /// notification, in subscription order. An `Err` or a panic is logged
    /// and does not stop delivery to the next handler.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared
            .dispatcher
            .subscribe(kind, registry::handler(handler))
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.dispatcher.unsubscribe(id)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.shared.dispatcher.subscriber_count(kind)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> StreamConfig {
        self.shared.lock().config.clone()
    }
}

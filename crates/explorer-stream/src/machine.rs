// ── Connection state machine ──
//
// One machine per `connect()` cycle, run as a background task. It owns the
// open transport stream, the connect-timeout or reconnect-delay timer, the
// backoff counter, and the coalescer. Aborting the task drops all of them at
// once, which is how `disconnect()` cancels everything.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backoff::{Backoff, BackoffStep};
use crate::client::Shared;
use crate::coalesce::EventCoalescer;
use crate::config::{MAX_WAIT, StreamConfig};
use crate::error::StreamError;
use crate::event::{ConnectionState, DisconnectReason, Notification};
use crate::frame::{self, CoalesceKey, DomainEvent, Frame, RawFrame};
use crate::transport::{FrameStream, Transport};

/// Resolves the `connect()` call that started the cycle.
pub(crate) type AckSender = oneshot::Sender<Result<serde_json::Value, StreamError>>;

#[derive(Debug, Clone, Copy)]
enum Timer {
    ConnectTimeout(Instant),
    ReconnectDelay(Instant),
}

impl Timer {
    fn deadline(self) -> Instant {
        match self {
            Self::ConnectTimeout(at) | Self::ReconnectDelay(at) => at,
        }
    }
}

/// What woke the machine up.
enum Wake {
    Cancelled,
    Coalesced(DomainEvent),
    Frame(Option<Result<RawFrame, StreamError>>),
    Timer,
}

impl From<DomainEvent> for Notification {
    fn from(event: DomainEvent) -> Self {
        match event {
            DomainEvent::FileChange(change) => Self::FileChange(change),
            DomainEvent::StructureUpdate(update) => Self::StructureUpdate(update),
        }
    }
}

pub(crate) struct ConnectionMachine {
    shared: Arc<Shared>,
    epoch: u64,
    endpoint: Url,
    transport: Arc<dyn Transport>,
    config: StreamConfig,
    state: ConnectionState,
    backoff: Backoff,
    coalescer: EventCoalescer<CoalesceKey, DomainEvent>,
    frames: Option<FrameStream>,
    timer: Option<Timer>,
    ack: Option<AckSender>,
}

impl ConnectionMachine {
    /// Build a machine for a stream `connect()` has already opened.
    pub(crate) fn new(
        shared: Arc<Shared>,
        epoch: u64,
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        endpoint: Url,
        frames: FrameStream,
        ack: AckSender,
    ) -> Self {
        let timer = Timer::ConnectTimeout(deadline_after(config.connect_timeout));
        Self {
            shared,
            epoch,
            endpoint,
            transport,
            backoff: Backoff::from_config(&config),
            coalescer: EventCoalescer::new(config.event_debounce),
            config,
            state: ConnectionState::Connecting,
            frames: Some(frames),
            timer: Some(timer),
            ack: Some(ack),
        }
    }

    /// Drive the cycle until it is cancelled or has nothing left to do.
    ///
    /// A cycle with no open stream and no timer still runs until pending
    /// coalesced events have been delivered.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        while self.frames.is_some() || self.timer.is_some() || !self.coalescer.is_empty() {
            match self.wait(&cancel).await {
                Wake::Cancelled => {
                    self.coalescer.clear();
                    return;
                }
                Wake::Coalesced(event) => self.emit(event.into()),
                Wake::Frame(item) => self.on_frame(item),
                Wake::Timer => self.on_timer(),
            }
        }
        tracing::debug!(epoch = self.epoch, "connect cycle finished");
        self.shared.finish_cycle(self.epoch);
    }

    async fn wait(&mut self, cancel: &CancellationToken) -> Wake {
        let deadline = self.timer.map(Timer::deadline);
        let streaming = self.frames.is_some();
        let buffered = !self.coalescer.is_empty();
        let frames = &mut self.frames;
        let coalescer = &mut self.coalescer;

        tokio::select! {
            biased;
            () = cancel.cancelled() => Wake::Cancelled,
            Some((_, event)) = coalescer.next_expired(), if buffered => Wake::Coalesced(event),
            item = next_frame(frames), if streaming => Wake::Frame(item),
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                Wake::Timer
            }
        }
    }

    // ── Reactions ────────────────────────────────────────────────────

    fn on_frame(&mut self, item: Option<Result<RawFrame, StreamError>>) {
        let raw = match item {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return self.on_failure(e),
            None => return self.on_failure(StreamError::Closed),
        };

        match frame::classify(&raw) {
            Ok(Frame::Connected(server_info)) => self.on_ack(server_info),
            Ok(Frame::Message(data)) => self.emit(Notification::Message { data }),
            Ok(Frame::Domain(event)) => self.coalescer.absorb(event.coalesce_key(), event),
            Ok(Frame::Unknown { name, data }) => {
                tracing::debug!(event = %name, "unrecognized frame");
                self.emit(Notification::Unknown { name, data });
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
            }
        }
    }

    fn on_ack(&mut self, server_info: serde_json::Value) {
        if self.state == ConnectionState::Connecting {
            self.timer = None;
            self.backoff.reset();
            self.set_state(ConnectionState::Connected);
            tracing::info!(url = %self.endpoint, "explorer event stream connected");
        }
        self.emit(Notification::Connected {
            server_info: server_info.clone(),
        });
        if let Some(ack) = self.ack.take() {
            // A subscriber may have disconnected us while we announced it.
            let outcome = if self.shared.is_current(self.epoch) {
                Ok(server_info)
            } else {
                Err(StreamError::Superseded)
            };
            let _ = ack.send(outcome);
        }
    }

    fn on_timer(&mut self) {
        match self.timer.take() {
            Some(Timer::ConnectTimeout(_)) => self.on_failure(StreamError::ConnectTimeout {
                timeout: self.config.connect_timeout,
            }),
            Some(Timer::ReconnectDelay(_)) => self.attempt_reconnect(),
            None => {}
        }
    }

    /// Transport failed, the server hung up, or the ack never came.
    fn on_failure(&mut self, error: StreamError) {
        // Dropping the stream closes the connection.
        self.frames = None;
        self.timer = None;

        match self.state {
            ConnectionState::Connecting => {
                tracing::warn!(
                    error = %error,
                    attempt = self.backoff.attempt(),
                    "event stream failed before acknowledgement"
                );
                self.emit(Notification::Error {
                    detail: error.to_string(),
                });
                self.set_state(ConnectionState::Disconnected);

                // An explicit connect() reports to its caller and stops there.
                if let Some(ack) = self.ack.take() {
                    let _ = ack.send(Err(error));
                    return;
                }
                self.schedule_reconnect();
            }
            ConnectionState::Connected => {
                tracing::warn!(error = %error, "explorer event stream dropped");
                self.emit(Notification::Error {
                    detail: error.to_string(),
                });
                self.set_state(ConnectionState::Disconnected);
                self.emit(Notification::Disconnected {
                    reason: DisconnectReason::Error,
                });
                if self.config.auto_reconnect {
                    self.schedule_reconnect();
                }
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.backoff.next_step() {
            BackoffStep::Retry { delay, attempt } => {
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );
                self.set_state(ConnectionState::Reconnecting);
                self.timer = Some(Timer::ReconnectDelay(deadline_after(delay)));
            }
            BackoffStep::Exhausted { attempts } => {
                tracing::error!(attempts, "reconnection limit reached, giving up");
                self.emit(Notification::ReconnectFailed { attempts });
            }
            BackoffStep::Idle => {}
        }
    }

    fn attempt_reconnect(&mut self) {
        self.backoff.begin_attempt();
        self.set_state(ConnectionState::Connecting);
        // A subscriber may have disconnected us from inside that transition.
        if !self.shared.is_current(self.epoch) {
            return;
        }
        tracing::debug!(attempt = self.backoff.attempt(), "reconnecting");

        match self.transport.open(&self.endpoint) {
            Ok(frames) => {
                self.frames = Some(frames);
                self.timer = Some(Timer::ConnectTimeout(deadline_after(
                    self.config.connect_timeout,
                )));
            }
            Err(e) => self.on_failure(e),
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.shared.transition(self.epoch, state);
    }

    fn emit(&self, notification: Notification) {
        self.shared.emit(self.epoch, &notification);
    }
}

fn deadline_after(wait: Duration) -> Instant {
    Instant::now() + wait.min(MAX_WAIT)
}

async fn next_frame(frames: &mut Option<FrameStream>) -> Option<Result<RawFrame, StreamError>> {
    match frames {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

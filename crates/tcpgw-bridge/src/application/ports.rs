//! Ports between the session logic and the outside world.
//!
//! The [`Session`](super::session::Session) never touches a socket directly.
//! Everything it needs from the network goes through the types in this file:
//!
//! ```text
//!               ClientHandle (mpsc)            GatewayDialer / GatewayLink
//!  client  ◀──── writer task ◀──── Session ────▶ WebSocket to the gateway
//!  socket                             ▲                 │
//!                                     │ SessionSignal   │ pump task
//!                                     └──────────────── UpstreamSink
//! ```
//!
//! - [`ClientHandle`] queues lines for the single task that owns the client's
//!   write half.  Every byte the relay writes to a client goes through it.
//! - [`GatewayDialer`] opens a gateway connection and returns a
//!   [`GatewayLink`] for sending to it.
//! - [`UpstreamSink`] is handed to the dialer.  The gateway's reader (the
//!   "pump") uses it to push filtered frames to the client and, exactly once,
//!   to report that the gateway connection has ended.
//!
//! Because these are traits and channel handles, the session can be unit
//! tested with in-memory doubles instead of real sockets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tcpgw_core::protocol::to_single_line;
use tcpgw_core::{ControlMessage, EventFilter, SessionId};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// The event filter, shared by a session and its gateway pump.
///
/// The session replaces the set on `GATEWAY_CONNECT` and
/// `GATEWAY_UPDATE_SUPPORTED_EVENTS`; the pump reads it for every frame.
pub type SharedFilter = Arc<RwLock<EventFilter>>;

/// Creates an unrestricted [`SharedFilter`].
pub fn shared_filter() -> SharedFilter {
    Arc::new(RwLock::new(EventFilter::allow_all()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures talking to the upstream gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to connect to gateway: {0}")]
    Connect(String),

    #[error("timed out after {0:?} connecting to gateway")]
    Timeout(Duration),

    #[error("gateway not connected")]
    NotConnected,

    #[error("failed to send to gateway: {0}")]
    Send(String),
}

/// The client's writer task has stopped; nothing more can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client connection is closed")]
pub struct ClientGone;

// ── Client side ───────────────────────────────────────────────────────────────

/// Instructions for the client writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCommand {
    /// Write the line followed by `\n`.  The line itself never contains `\n`.
    Line(String),
    /// Flush what is queued before this command, then shut the write half.
    Shutdown,
}

/// Cloneable handle to a client's outbound queue.
///
/// The queue is bounded.  When the client reads slowly, senders wait for
/// room, which is how backpressure reaches the gateway pump.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl ClientHandle {
    /// Creates a handle plus the receiving end the writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WriterCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues one line for the client.
    pub async fn send_line(&self, line: String) -> Result<(), ClientGone> {
        self.tx
            .send(WriterCommand::Line(line))
            .await
            .map_err(|_| ClientGone)
    }

    /// Encodes and queues a control message.
    pub async fn send_control(&self, message: &ControlMessage) -> Result<(), ClientGone> {
        self.send_line(message.encode()).await
    }

    /// Asks the writer to finish.  Never waits: if the queue is full the
    /// writer still stops once every handle has been dropped.
    pub fn request_shutdown(&self) {
        let _ = self.tx.try_send(WriterCommand::Shutdown);
    }

    /// `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ── Gateway side ──────────────────────────────────────────────────────────────

/// Messages delivered to the session task from elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The gateway connection opened as `generation` has ended.
    GatewayClosed { generation: u64, reason: String },
}

/// What happened to one upstream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the client.
    Forwarded,
    /// Its type is not in the allowed set.
    Filtered,
    /// Contained a raw newline and was not JSON, so it cannot be framed.
    Unframeable,
}

/// The pump's view of a session: where upstream frames go and whom to tell
/// when the gateway connection ends.
///
/// The closure notice is sent exactly once: either by
/// [`UpstreamSink::closed`] or, if the sink is dropped without it, by `Drop`.
#[derive(Debug)]
pub struct UpstreamSink {
    session: SessionId,
    generation: u64,
    filter: SharedFilter,
    client: ClientHandle,
    signals: Option<mpsc::UnboundedSender<SessionSignal>>,
}

impl UpstreamSink {
    pub fn new(
        session: SessionId,
        generation: u64,
        filter: SharedFilter,
        client: ClientHandle,
        signals: mpsc::UnboundedSender<SessionSignal>,
    ) -> Self {
        Self {
            session,
            generation,
            filter,
            client,
            signals: Some(signals),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs one upstream text frame through the filter and, if admitted,
    /// queues it for the client unchanged.
    ///
    /// # Errors
    ///
    /// [`ClientGone`] when the client writer has stopped; the pump should end.
    pub async fn deliver(&self, raw: String) -> Result<Delivery, ClientGone> {
        if !self.filter.read().await.admits(&raw) {
            return Ok(Delivery::Filtered);
        }
        let Some(line) = to_single_line(raw) else {
            warn!(
                "session {}: dropping upstream frame with embedded newline",
                self.session
            );
            return Ok(Delivery::Unframeable);
        };
        self.client.send_line(line).await?;
        Ok(Delivery::Forwarded)
    }

    /// Reports that the gateway connection has ended.
    pub fn closed(mut self, reason: impl Into<String>) {
        self.notify(reason.into());
    }

    fn notify(&mut self, reason: String) {
        if let Some(signals) = self.signals.take() {
            debug!(
                "session {}: gateway generation {} ended: {reason}",
                self.session, self.generation
            );
            // The session may already be gone; nobody is left to tell.
            let _ = signals.send(SessionSignal::GatewayClosed {
                generation: self.generation,
                reason,
            });
        }
    }
}

impl Drop for UpstreamSink {
    fn drop(&mut self) {
        self.notify("gateway reader stopped".to_string());
    }
}

/// Opens gateway connections.
///
/// Implementations start a reader for the new connection that feeds `sink`
/// and must call [`UpstreamSink::closed`] (or drop the sink) when that reader
/// ends.  Frames are delivered through `sink` before `open` even returns.
#[async_trait]
pub trait GatewayDialer: Send + Sync {
    async fn open(
        &self,
        url: &str,
        sink: UpstreamSink,
    ) -> Result<Box<dyn GatewayLink>, GatewayError>;
}

/// The sending side of one open gateway connection.
#[async_trait]
pub trait GatewayLink: Send + Sync {
    /// Sends one text frame, verbatim.
    async fn send(&mut self, frame: String) -> Result<(), GatewayError>;

    /// Closes the connection and stops its reader.  Safe to call repeatedly.
    async fn close(&mut self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

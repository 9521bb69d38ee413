//! The per-connection session: what the relay does with each client frame.
//!
//! # How a session works (for beginners)
//!
//! A session begins the moment a client connects.  The relay immediately
//! sends `GATEWAY_HELLO`, then reads newline-delimited frames:
//!
//! 1. Control frames (`"op": -1`) drive the session itself:
//!    - `GATEWAY_CONNECT` opens a WebSocket to the URL the client names,
//!      replacing any connection already open.
//!    - `GATEWAY_UPDATE_SUPPORTED_EVENTS` changes which upstream event types
//!      reach the client.
//!    - `GATEWAY_DISCONNECT` ends the session.
//! 2. Every other JSON frame is passed to the gateway unchanged.
//!
//! Frames from the gateway flow the other way without involving the session
//! at all: the gateway reader filters them and queues them straight for the
//! client (see [`UpstreamSink`]).  The session only hears from the gateway
//! when that connection ends.
//!
//! # Concurrency
//!
//! One task owns the [`Session`] and calls its methods one at a time, so no
//! state here needs a lock.  Every method that can end the session returns
//! [`ControlFlow::Break`]; the owner then calls [`Session::close`].

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tcpgw_core::protocol::control::ConnectRequest;
use tcpgw_core::protocol::{decode, looks_like_http_request, redact_for_log};
use tcpgw_core::{
    ControlError, ControlMessage, Envelope, FrameError, SessionId, SessionState,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::ports::{
    shared_filter, ClientHandle, GatewayDialer, GatewayError, GatewayLink, SessionSignal,
    SharedFilter, UpstreamSink,
};
use super::registry::RegistrySlot;

/// Message in the final `GATEWAY_DISCONNECT` of every session.
pub const CONNECTION_CLOSED: &str = "Connection closed";

/// Reply to a client that sends an HTTP request to the relay port.
pub const HTTP_ON_RELAY_PORT: &str =
    "this port speaks newline-delimited JSON, not HTTP; use the status port for HTTP";

/// Settings a session needs from the relay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    /// Bound on queueing the final `GATEWAY_DISCONNECT`.
    pub close_timeout: Duration,
}

/// State of one client connection.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    closing: bool,
    settings: SessionSettings,
    client: ClientHandle,
    dialer: Arc<dyn GatewayDialer>,
    gateway: Option<Box<dyn GatewayLink>>,
    /// Generation stamped on the most recent connect attempt.
    generation: u64,
    /// Generation of the gateway in `gateway`, if one is installed.
    live_generation: Option<u64>,
    filter: SharedFilter,
    signals: mpsc::UnboundedSender<SessionSignal>,
    slot: Option<RegistrySlot>,
}

impl Session {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        client: ClientHandle,
        dialer: Arc<dyn GatewayDialer>,
        signals: mpsc::UnboundedSender<SessionSignal>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id,
            peer,
            state: SessionState::HelloSent,
            closing: false,
            settings,
            client,
            dialer,
            gateway: None,
            generation: 0,
            live_generation: None,
            filter: shared_filter(),
            signals,
            slot: None,
        }
    }

    /// Ties the session's registry entry to its lifetime.  The slot is
    /// released during [`Session::close`].
    pub fn with_registry_slot(mut self, slot: RegistrySlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn filter(&self) -> SharedFilter {
        Arc::clone(&self.filter)
    }

    /// Queues `GATEWAY_HELLO`.  Must run before any frame is handled.
    pub async fn start(&mut self) -> ControlFlow<()> {
        info!("session {}: client connected from {}", self.id, self.peer);
        if self.client.send_control(&ControlMessage::Hello).await.is_err() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Handles one complete frame from the client.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> ControlFlow<()> {
        if self.state.is_terminating() {
            return ControlFlow::Break(());
        }
        if frame.iter().all(u8::is_ascii_whitespace) {
            return ControlFlow::Continue(());
        }

        let envelope = match decode(frame) {
            Ok(envelope) => envelope,
            Err(e) if looks_like_http_request(frame) => {
                warn!(
                    "session {}: HTTP request on the relay port from {} ({e})",
                    self.id, self.peer
                );
                let _ = self.reply_error(HTTP_ON_RELAY_PORT).await;
                return ControlFlow::Break(());
            }
            Err(e) => {
                warn!("session {}: dropping malformed frame: {e}", self.id);
                return ControlFlow::Continue(());
            }
        };

        if envelope.is_control() {
            self.handle_control(&envelope).await
        } else {
            self.forward_to_gateway(frame, &envelope).await
        }
    }

    /// Handles a framing failure.  An oversize frame is a protocol violation.
    pub async fn handle_frame_error(&mut self, error: FrameError) -> ControlFlow<()> {
        warn!("session {}: {error}", self.id);
        let _ = self.reply_error(error.to_string()).await;
        ControlFlow::Break(())
    }

    /// Handles a message from the gateway side.
    pub async fn handle_signal(&mut self, signal: SessionSignal) -> ControlFlow<()> {
        match signal {
            SessionSignal::GatewayClosed { generation, reason } => {
                if self.live_generation != Some(generation) {
                    debug!(
                        "session {}: ignoring closure of superseded gateway {generation}",
                        self.id
                    );
                    return ControlFlow::Continue(());
                }
                info!("session {}: gateway connection ended: {reason}", self.id);
                ControlFlow::Break(())
            }
        }
    }

    /// Tears the session down.  Only the first call does anything.
    ///
    /// Order: close the gateway, tell the client `GATEWAY_DISCONNECT`, stop
    /// the client writer, leave the registry.
    pub async fn close(&mut self, reason: &str) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.transition(SessionState::Closing);
        info!(
            "session {}: closing connection from {} ({reason})",
            self.id, self.peer
        );

        self.live_generation = None;
        if let Some(mut gateway) = self.gateway.take() {
            gateway.close().await;
        }

        // Best effort; a client that stopped reading must not stall teardown.
        let notice = ControlMessage::disconnect(CONNECTION_CLOSED);
        let _ = timeout(self.settings.close_timeout, self.client.send_control(&notice)).await;
        self.client.request_shutdown();

        self.slot.take();
        self.transition(SessionState::Closed);
    }

    async fn handle_control(&mut self, envelope: &Envelope) -> ControlFlow<()> {
        let message = match ControlMessage::from_envelope(envelope) {
            Ok(message) => message,
            Err(ControlError::UnknownType(kind)) => {
                debug!("session {}: ignoring unknown control type {kind}", self.id);
                return ControlFlow::Continue(());
            }
            Err(e) => {
                warn!("session {}: {e}", self.id);
                return self.reply_error(format!("invalid control message: {e}")).await;
            }
        };

        match message {
            ControlMessage::Connect(request) => self.connect(request).await,
            ControlMessage::UpdateSupportedEvents(update) => {
                info!(
                    "session {}: supported events now {:?}",
                    self.id, update.supported_events
                );
                self.filter.write().await.replace(update.supported_events);
                ControlFlow::Continue(())
            }
            ControlMessage::Disconnect(_) => {
                info!("session {}: client requested disconnect", self.id);
                ControlFlow::Break(())
            }
            other @ (ControlMessage::Hello | ControlMessage::Error(_)) => {
                debug!("session {}: ignoring client-sent {}", self.id, other.kind());
                ControlFlow::Continue(())
            }
        }
    }

    async fn connect(&mut self, request: ConnectRequest) -> ControlFlow<()> {
        if let Some(mut previous) = self.gateway.take() {
            info!("session {}: replacing existing gateway connection", self.id);
            self.live_generation = None;
            previous.close().await;
        }
        self.transition(SessionState::AwaitingGateway);

        let events = request.supported_events.unwrap_or_default();
        self.filter.write().await.replace(events);

        self.generation += 1;
        let generation = self.generation;
        let sink = UpstreamSink::new(
            self.id,
            generation,
            Arc::clone(&self.filter),
            self.client.clone(),
            self.signals.clone(),
        );

        info!("session {}: connecting to gateway {}", self.id, request.url);
        let limit = self.settings.connect_timeout;
        let result = match timeout(limit, self.dialer.open(&request.url, sink)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(limit)),
        };

        match result {
            Ok(link) => {
                self.gateway = Some(link);
                self.live_generation = Some(generation);
                self.transition(SessionState::Connected);
                info!("session {}: gateway connected", self.id);
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!("session {}: gateway connect failed: {e}", self.id);
                self.reply_error(format!("gateway connect failed: {e}")).await
            }
        }
    }

    async fn forward_to_gateway(&mut self, frame: &[u8], envelope: &Envelope) -> ControlFlow<()> {
        let Some(gateway) = self.gateway.as_mut() else {
            debug!("session {}: payload before gateway connected", self.id);
            return self.reply_error(GatewayError::NotConnected.to_string()).await;
        };

        debug!(
            "session {}: client -> gateway {}",
            self.id,
            redact_for_log(envelope.body())
        );
        let text = String::from_utf8_lossy(frame).into_owned();
        match gateway.send(text).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                warn!("session {}: {e}", self.id);
                let _ = self.reply_error(format!("failed to forward payload: {e}")).await;
                ControlFlow::Break(())
            }
        }
    }

    /// Sends `GATEWAY_ERROR`.  Breaks only when the client is gone.
    async fn reply_error(&self, message: impl Into<String>) -> ControlFlow<()> {
        match self.client.send_control(&ControlMessage::error(message)).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!("session {}: {} -> {next}", self.id, self.state);
            self.state = next;
        } else if self.state != next {
            warn!(
                "session {}: ignoring illegal transition {} -> {next}",
                self.id, self.state
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
    use tokio_test::assert_ok;

    use super::super::ports::WriterCommand;
    use super::super::registry::SessionRegistry;
    use super::*;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Records everything sent through one link.
    #[derive(Default)]
    struct LinkLog {
        sent: Mutex<Vec<String>>,
        closes: AtomicUsize,
    }

    struct RecordingLink {
        log: Arc<LinkLog>,
        fail_sends: bool,
    }

    #[async_trait]
    impl GatewayLink for RecordingLink {
        async fn send(&mut self, frame: String) -> Result<(), GatewayError> {
            if self.fail_sends {
                return Err(GatewayError::Send("injected failure".to_string()));
            }
            self.log.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&mut self) {
            self.log.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum DialMode {
        Succeed,
        Fail,
        Hang,
        FailSends,
    }

    /// Opens in-memory links and keeps every sink so tests can play the
    /// gateway's part.
    struct RecordingDialer {
        mode: DialMode,
        urls: Mutex<Vec<String>>,
        links: Mutex<Vec<Arc<LinkLog>>>,
        sinks: Mutex<Vec<UpstreamSink>>,
    }

    impl RecordingDialer {
        fn new(mode: DialMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                urls: Mutex::default(),
                links: Mutex::default(),
                sinks: Mutex::default(),
            })
        }

        fn link(&self, index: usize) -> Arc<LinkLog> {
            Arc::clone(&self.links.lock().unwrap()[index])
        }

        fn take_sink(&self, index: usize) -> UpstreamSink {
            self.sinks.lock().unwrap().remove(index)
        }
    }

    #[async_trait]
    impl GatewayDialer for RecordingDialer {
        async fn open(
            &self,
            url: &str,
            sink: UpstreamSink,
        ) -> Result<Box<dyn GatewayLink>, GatewayError> {
            self.urls.lock().unwrap().push(url.to_string());
            match self.mode {
                DialMode::Fail => Err(GatewayError::Connect("connection refused".to_string())),
                DialMode::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                DialMode::Succeed | DialMode::FailSends => {
                    let log = Arc::new(LinkLog::default());
                    self.links.lock().unwrap().push(Arc::clone(&log));
                    self.sinks.lock().unwrap().push(sink);
                    Ok(Box::new(RecordingLink {
                        log,
                        fail_sends: self.mode == DialMode::FailSends,
                    }))
                }
            }
        }
    }

    struct Harness {
        session: Session,
        dialer: Arc<RecordingDialer>,
        out: Receiver<WriterCommand>,
        signals: UnboundedReceiver<SessionSignal>,
    }

    fn make_session(mode: DialMode) -> Harness {
        make_session_with_timeout(mode, Duration::from_secs(5))
    }

    fn make_session_with_timeout(mode: DialMode, connect_timeout: Duration) -> Harness {
        let dialer = RecordingDialer::new(mode);
        let (client, out) = ClientHandle::channel(64);
        let (sig_tx, signals) = mpsc::unbounded_channel();
        let session = Session::new(
            SessionId::new(),
            SocketAddr::from(([127, 0, 0, 1], 40000)),
            client,
            Arc::clone(&dialer) as Arc<dyn GatewayDialer>,
            sig_tx,
            SessionSettings {
                connect_timeout,
                close_timeout: Duration::from_millis(200),
            },
        );
        Harness {
            session,
            dialer,
            out,
            signals,
        }
    }

    /// Drains the writer queue into plain lines (`<shutdown>` for Shutdown).
    fn drain(out: &mut Receiver<WriterCommand>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(cmd) = out.try_recv() {
            lines.push(match cmd {
                WriterCommand::Line(line) => line,
                WriterCommand::Shutdown => "<shutdown>".to_string(),
            });
        }
        lines
    }

    fn connect_frame(url: &str, events: &[&str]) -> Vec<u8> {
        serde_json::json!({
            "op": -1,
            "t": "GATEWAY_CONNECT",
            "d": { "url": url, "supported_events": events }
        })
        .to_string()
        .into_bytes()
    }

    const HELLO: &str = r#"{"op":-1,"t":"GATEWAY_HELLO"}"#;
    const DISCONNECT: &str =
        r#"{"op":-1,"t":"GATEWAY_DISCONNECT","d":{"message":"Connection closed"}}"#;
    const NOT_CONNECTED: &str =
        r#"{"op":-1,"t":"GATEWAY_ERROR","d":{"message":"gateway not connected"}}"#;

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_sends_hello_first() {
        // Arrange
        let mut h = make_session(DialMode::Succeed);

        // Act
        let flow = h.session.start().await;

        // Assert
        assert!(flow.is_continue());
        assert_eq!(drain(&mut h.out), vec![HELLO.to_string()]);
        assert_eq!(h.session.state(), SessionState::HelloSent);
    }

    #[tokio::test]
    async fn test_start_breaks_when_client_is_gone() {
        let mut h = make_session(DialMode::Succeed);
        drop(h.out);

        assert!(h.session.start().await.is_break());
    }

    #[tokio::test]
    async fn test_close_sends_disconnect_then_shutdown() {
        let mut h = make_session(DialMode::Succeed);
        h.session.start().await;
        drain(&mut h.out);

        h.session.close("test").await;

        assert_eq!(
            drain(&mut h.out),
            vec![DISCONNECT.to_string(), "<shutdown>".to_string()]
        );
        assert_eq!(h.session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_twice_runs_teardown_once() {
        // Arrange: connected, registered session
        let registry = SessionRegistry::new();
        let mut h = make_session(DialMode::Succeed);
        let slot = registry.register(h.session.id(), SocketAddr::from(([127, 0, 0, 1], 1)));
        h.session = h.session.with_registry_slot(slot);
        h.session.start().await;
        h.session.handle_frame(&connect_frame("wss://gw", &[])).await;
        drain(&mut h.out);

        // Act
        h.session.close("first").await;
        h.session.close("second").await;

        // Assert: one gateway close, one DISCONNECT, one shutdown, slot released
        assert_eq!(h.dialer.link(0).closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut h.out),
            vec![DISCONNECT.to_string(), "<shutdown>".to_string()]
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_frames_after_close_break() {
        let mut h = make_session(DialMode::Succeed);
        h.session.close("done").await;

        assert!(h.session.handle_frame(br#"{"op":1}"#).await.is_break());
    }

    // ── Connect ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_connect_opens_gateway_and_sets_filter() {
        let mut h = make_session(DialMode::Succeed);
        h.session.start().await;

        let flow = h.session.handle_frame(&connect_frame("wss://gw/?v=9", &["A"])).await;

        assert!(flow.is_continue());
        assert_eq!(h.session.state(), SessionState::Connected);
        assert!(h.session.has_gateway());
        assert_eq!(*h.dialer.urls.lock().unwrap(), vec!["wss://gw/?v=9".to_string()]);
        let filter = h.session.filter();
        let filter = filter.read().await;
        assert!(filter.should_forward(Some("A")));
        assert!(!filter.should_forward(Some("B")));
    }

    #[tokio::test]
    async fn test_connect_without_events_forwards_everything() {
        let mut h = make_session(DialMode::Succeed);
        let frame = br#"{"op":-1,"t":"GATEWAY_CONNECT","d":{"url":"wss://gw"}}"#;

        h.session.handle_frame(frame).await;

        assert!(h.session.filter().read().await.is_unrestricted());
    }

    #[tokio::test]
    async fn test_second_connect_replaces_first_gateway() {
        // Arrange
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://one", &[])).await;

        // Act
        h.session.handle_frame(&connect_frame("wss://two", &[])).await;

        // Assert: the first link was closed exactly once, the second is live
        assert_eq!(h.dialer.link(0).closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.dialer.link(1).closes.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.state(), SessionState::Connected);

        h.session.handle_frame(br#"{"op":1,"d":null}"#).await;
        assert!(h.dialer.link(0).sent.lock().unwrap().is_empty());
        assert_eq!(h.dialer.link(1).sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_gateway_closure_is_ignored() {
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://one", &[])).await;
        h.session.handle_frame(&connect_frame("wss://two", &[])).await;

        // The first pump ends after its link was replaced.
        h.dialer.take_sink(0).closed("replaced");
        let signal = h.signals.try_recv().unwrap();

        assert!(h.session.handle_signal(signal).await.is_continue());
        assert_eq!(h.session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_live_gateway_closure_ends_session() {
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://gw", &[])).await;

        h.dialer.take_sink(0).closed("gateway went away");
        let signal = h.signals.try_recv().unwrap();

        assert!(h.session.handle_signal(signal).await.is_break());
    }

    #[tokio::test]
    async fn test_connect_failure_keeps_session_awaiting() {
        // Arrange
        let mut h = make_session(DialMode::Fail);
        h.session.start().await;
        drain(&mut h.out);

        // Act
        let flow = h.session.handle_frame(&connect_frame("wss://down", &[])).await;

        // Assert: error reported, session still alive without a gateway
        assert!(flow.is_continue());
        assert_eq!(h.session.state(), SessionState::AwaitingGateway);
        assert!(!h.session.has_gateway());
        let lines = drain(&mut h.out);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("GATEWAY_ERROR"));
        assert!(lines[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_connect_timeout_is_reported() {
        let mut h = make_session_with_timeout(DialMode::Hang, Duration::from_millis(50));

        let flow = h.session.handle_frame(&connect_frame("wss://slow", &[])).await;

        assert!(flow.is_continue());
        let lines = drain(&mut h.out);
        assert!(lines[0].contains("timed out"));
        assert!(!h.session.has_gateway());
    }

    #[tokio::test]
    async fn test_stale_signal_after_failed_connect_is_ignored() {
        // A hung dial is abandoned; its sink is dropped and signals closure.
        let mut h = make_session_with_timeout(DialMode::Hang, Duration::from_millis(20));
        h.session.handle_frame(&connect_frame("wss://slow", &[])).await;

        let signal = h.signals.try_recv().unwrap();

        assert!(h.session.handle_signal(signal).await.is_continue());
    }

    #[tokio::test]
    async fn test_connect_missing_url_is_reported_not_fatal() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h
            .session
            .handle_frame(br#"{"op":-1,"t":"GATEWAY_CONNECT","d":{}}"#)
            .await;

        assert!(flow.is_continue());
        let lines = drain(&mut h.out);
        assert!(lines[0].contains("invalid control message"));
        assert!(h.dialer.urls.lock().unwrap().is_empty());
    }

    // ── Pass-through ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_payload_before_connect_gets_not_connected_error() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h.session.handle_frame(br#"{"op":2,"d":{}}"#).await;

        assert!(flow.is_continue());
        assert_eq!(drain(&mut h.out), vec![NOT_CONNECTED.to_string()]);
    }

    #[tokio::test]
    async fn test_payload_is_forwarded_verbatim() {
        // Arrange
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://gw", &[])).await;
        let payload = br#"{ "op":2, "d":{"token":"secret","intents":513} }"#;

        // Act
        let flow = h.session.handle_frame(payload).await;

        // Assert: the gateway sees the exact bytes, token included
        assert!(flow.is_continue());
        assert_eq!(
            *h.dialer.link(0).sent.lock().unwrap(),
            vec![String::from_utf8(payload.to_vec()).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_non_object_json_is_forwarded() {
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://gw", &[])).await;

        h.session.handle_frame(b"[1,2,3]").await;

        assert_eq!(*h.dialer.link(0).sent.lock().unwrap(), vec!["[1,2,3]".to_string()]);
    }

    #[tokio::test]
    async fn test_send_failure_ends_session() {
        let mut h = make_session(DialMode::FailSends);
        h.session.handle_frame(&connect_frame("wss://gw", &[])).await;
        drain(&mut h.out);

        let flow = h.session.handle_frame(br#"{"op":1}"#).await;

        assert!(flow.is_break());
        assert!(drain(&mut h.out)[0].contains("failed to forward payload"));
    }

    // ── Other control messages ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_update_supported_events_replaces_filter() {
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://gw", &["A"])).await;

        h.session
            .handle_frame(
                br#"{"op":-1,"t":"GATEWAY_UPDATE_SUPPORTED_EVENTS","d":{"supported_events":["B"]}}"#,
            )
            .await;

        let filter = h.session.filter();
        let filter = filter.read().await;
        assert!(!filter.should_forward(Some("A")));
        assert!(filter.should_forward(Some("B")));
    }

    #[tokio::test]
    async fn test_filter_update_applies_to_upstream_frames() {
        let mut h = make_session(DialMode::Succeed);
        h.session.handle_frame(&connect_frame("wss://gw", &["A"])).await;
        drain(&mut h.out);
        let sink = h.dialer.take_sink(0);

        h.session
            .handle_frame(br#"{"op":-1,"t":"GATEWAY_UPDATE_SUPPORTED_EVENTS","d":{"supportedEvents":["B"]}}"#)
            .await;
        assert_ok!(sink.deliver(r#"{"t":"A"}"#.to_string()).await);
        assert_ok!(sink.deliver(r#"{"t":"B"}"#.to_string()).await);

        assert_eq!(drain(&mut h.out), vec![r#"{"t":"B"}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_request_breaks() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h.session.handle_frame(br#"{"op":-1,"t":"GATEWAY_DISCONNECT"}"#).await;

        assert!(flow.is_break());
    }

    #[tokio::test]
    async fn test_unknown_control_type_is_ignored() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h.session.handle_frame(br#"{"op":-1,"t":"GATEWAY_RESUME"}"#).await;

        assert!(flow.is_continue());
        assert!(drain(&mut h.out).is_empty());
    }

    // ── Malformed input ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_malformed_json_is_dropped_silently() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h.session.handle_frame(b"{not json").await;

        assert!(flow.is_continue());
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn test_blank_line_is_ignored() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h.session.handle_frame(b"  \r").await;

        assert!(flow.is_continue());
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn test_http_request_line_is_rejected() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h.session.handle_frame(b"GET / HTTP/1.1\r").await;

        assert!(flow.is_break());
        let lines = drain(&mut h.out);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("GATEWAY_ERROR"));
        assert!(lines[0].contains("not HTTP"));
    }

    #[tokio::test]
    async fn test_oversize_frame_is_a_protocol_violation() {
        let mut h = make_session(DialMode::Succeed);

        let flow = h
            .session
            .handle_frame_error(FrameError::FrameTooLong { len: 10, max: 4 })
            .await;

        assert!(flow.is_break());
        assert!(drain(&mut h.out)[0].contains("frame exceeds maximum length"));
    }
}

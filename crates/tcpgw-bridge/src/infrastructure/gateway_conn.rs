//! Gateway connector: the outbound WebSocket to the upstream gateway.
//!
//! [`WsDialer`] implements [`GatewayDialer`] with `tokio-tungstenite`.  Each
//! open connection is split in two:
//!
//! - the write half stays in a [`WsGatewayLink`], which the session uses to
//!   send client payloads;
//! - the read half moves into a *pump* task that hands every text frame to
//!   the session's [`UpstreamSink`] (which filters it and queues it for the
//!   client) and reports closure when the stream ends.
//!
//! The link owns the pump's `JoinHandle`.  Closing the link sends a WebSocket
//! Close frame, gives the gateway `close_timeout` to finish the handshake
//! (the pump exits once it sees the reply), then aborts the pump.
//!
//! Both `ws://` and `wss://` URLs are accepted.  TLS uses rustls with the
//! platform's native root certificates.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::application::ports::{
    ClientGone, Delivery, GatewayDialer, GatewayError, GatewayLink, UpstreamSink,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Selects the `ring` provider for every rustls config built in this
/// process.  Call once at startup, before the first `wss://` connect.
pub fn install_tls_provider() {
    // Err only means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Opens WebSocket connections to gateways.
#[derive(Debug, Clone)]
pub struct WsDialer {
    close_timeout: Duration,
}

impl WsDialer {
    pub fn new(close_timeout: Duration) -> Self {
        Self { close_timeout }
    }
}

#[async_trait]
impl GatewayDialer for WsDialer {
    async fn open(
        &self,
        url: &str,
        sink: UpstreamSink,
    ) -> Result<Box<dyn GatewayLink>, GatewayError> {
        let request = url
            .into_client_request()
            .map_err(|e| GatewayError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        debug!(
            "session {}: gateway handshake complete ({})",
            sink.session(),
            response.status()
        );

        let (write, read) = ws.split();
        let pump = tokio::spawn(pump_gateway_frames(read, sink));

        Ok(Box::new(WsGatewayLink {
            write: Some(write),
            pump: Some(pump),
            close_timeout: self.close_timeout,
        }))
    }
}

/// Write half of one gateway connection, plus the pump reading the other half.
pub struct WsGatewayLink {
    write: Option<SplitSink<WsStream, WsMessage>>,
    pump: Option<JoinHandle<()>>,
    close_timeout: Duration,
}

impl WsGatewayLink {
    fn is_open(&self) -> bool {
        self.write.is_some() && self.pump.as_ref().is_some_and(|p| !p.is_finished())
    }
}

#[async_trait]
impl GatewayLink for WsGatewayLink {
    async fn send(&mut self, frame: String) -> Result<(), GatewayError> {
        if !self.is_open() {
            return Err(GatewayError::NotConnected);
        }
        let Some(write) = self.write.as_mut() else {
            return Err(GatewayError::NotConnected);
        };
        write
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| GatewayError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut write) = self.write.take() {
            match timeout(self.close_timeout, write.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("gateway close frame not sent: {e}"),
                Err(_) => debug!("gateway close frame timed out"),
            }
        }
        if let Some(mut pump) = self.pump.take() {
            if timeout(self.close_timeout, &mut pump).await.is_err() {
                warn!(
                    "gateway did not finish closing within {:?}; aborting reader",
                    self.close_timeout
                );
                pump.abort();
            }
        }
    }
}

impl Drop for WsGatewayLink {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Reads gateway frames until the stream ends, then reports closure.
async fn pump_gateway_frames(mut read: SplitStream<WsStream>, sink: UpstreamSink) {
    let reason = loop {
        let text = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    debug!(
                        "session {}: dropping non-UTF-8 binary gateway frame",
                        sink.session()
                    );
                    continue;
                }
            },
            Some(Ok(WsMessage::Close(frame))) => {
                break match frame {
                    Some(f) => format!("gateway sent close {} {}", u16::from(f.code), f.reason),
                    None => "gateway sent close".to_string(),
                };
            }
            // Ping replies are queued by tungstenite itself.
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
            Some(Err(e)) => break format!("gateway read error: {e}"),
            None => break "gateway stream ended".to_string(),
        };

        match sink.deliver(text).await {
            Ok(Delivery::Forwarded | Delivery::Filtered | Delivery::Unframeable) => {}
            Err(ClientGone) => break "client writer stopped".to_string(),
        }
    };
    sink.closed(reason);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! One client connection: the read loop and the single writer task.
//!
//! ```text
//!             ┌──────────── read loop (this task) ─────────────┐
//!  TCP read ─▶│ LineFramer ─▶ Session::handle_frame            │
//!             │ SessionSignal ─▶ Session::handle_signal        │
//!             └─────────────────────┬──────────────────────────┘
//!                                   │ ClientHandle (bounded mpsc)
//!  gateway pump ────────────────────┤
//!                                   ▼
//!                         writer task ─▶ TCP write
//! ```
//!
//! Only the writer task touches the write half, so lines from the session
//! and from the gateway pump can never interleave mid-line.  `GATEWAY_HELLO`
//! is queued before the first read, so it is always the first line out.

use std::net::SocketAddr;
use std::sync::Arc;

use tcpgw_core::{LineFramer, SessionId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::ports::{ClientHandle, GatewayDialer, WriterCommand};
use crate::application::registry::SessionRegistry;
use crate::application::session::{Session, SessionSettings};
use crate::domain::RelayConfig;

/// Size of each read from the client socket.
const READ_CHUNK: usize = 8 * 1024;

/// Everything a connection needs that outlives it.
#[derive(Clone)]
pub struct ConnectionContext {
    pub config: Arc<RelayConfig>,
    pub dialer: Arc<dyn GatewayDialer>,
    pub registry: SessionRegistry,
}

/// Starts the task that owns `writer` and returns the handle that feeds it.
pub fn spawn_client_writer<W>(
    writer: W,
    capacity: usize,
    session: SessionId,
) -> (ClientHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, rx) = ClientHandle::channel(capacity);
    let task = tokio::spawn(run_writer(writer, rx, session));
    (handle, task)
}

async fn run_writer<W>(mut writer: W, mut rx: mpsc::Receiver<WriterCommand>, session: SessionId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Line(mut line) => {
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    debug!("session {session}: client write failed: {e}");
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }
    // Refuse anything queued after this point.
    rx.close();
    if let Err(e) = writer.shutdown().await {
        debug!("session {session}: client shutdown failed: {e}");
    }
}

/// Serves one client connection from accept to teardown.
pub async fn handle_client<S>(stream: S, peer: SocketAddr, ctx: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = SessionId::new();
    let config = Arc::clone(&ctx.config);
    let (mut reader, writer) = tokio::io::split(stream);

    let slot = ctx.registry.register(id, peer);
    let (client, mut writer_task) = spawn_client_writer(writer, config.client_queue, id);
    let (signal_tx, mut signals) = mpsc::unbounded_channel();
    let settings = SessionSettings {
        connect_timeout: config.connect_timeout,
        close_timeout: config.close_timeout,
    };
    let mut session = Session::new(id, peer, client, ctx.dialer, signal_tx, settings)
        .with_registry_slot(slot);

    let mut framer = match config.max_frame_len {
        Some(max) => LineFramer::with_max_frame_len(max),
        None => LineFramer::new(),
    };

    let mut reason = "client closed the connection";
    if session.start().await.is_continue() {
        let mut buf = vec![0u8; READ_CHUNK];
        'read: loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => {
                            let dropped = framer.finish();
                            if dropped > 0 {
                                debug!("session {id}: discarding {dropped} bytes of unterminated frame");
                            }
                            break 'read;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            warn!("session {id}: client read error: {e}");
                            reason = "client read error";
                            break 'read;
                        }
                    };
                    for frame in framer.feed(&buf[..n]) {
                        let flow = match frame {
                            Ok(frame) => session.handle_frame(&frame).await,
                            Err(e) => session.handle_frame_error(e).await,
                        };
                        if flow.is_break() {
                            reason = "session ended";
                            break 'read;
                        }
                    }
                }
                Some(signal) = signals.recv() => {
                    if session.handle_signal(signal).await.is_break() {
                        reason = "gateway connection ended";
                        break 'read;
                    }
                }
            }
        }
    } else {
        reason = "client writer stopped before hello";
    }

    session.close(reason).await;
    drop(session);

    if timeout(config.close_timeout, &mut writer_task).await.is_err() {
        warn!(
            "session {id}: client did not drain within {:?}; dropping it",
            config.close_timeout
        );
        writer_task.abort();
    }
    info!("session {id}: connection from {peer} closed");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! TCP listener: accept loop and per-connection task spawning.
//!
//! This module is responsible for:
//!
//! 1. Binding the relay's TCP listener on the configured address.
//! 2. Accepting client connections.
//! 3. Spawning one task per connection (see [`handle_client`]).
//! 4. Stopping when the shared `running` flag is cleared, and reporting the
//!    sessions still live at that moment.
//!
//! # Scalability
//!
//! The accept loop never waits on a session: it accepts, spawns, and goes
//! straight back to `accept()`.  Sessions share nothing but the registry and
//! the read-only configuration, so one slow client or gateway never delays
//! another.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::client_conn::{handle_client, ConnectionContext};
use crate::application::ports::GatewayDialer;
use crate::application::registry::SessionRegistry;
use crate::domain::RelayConfig;

/// How often the accept loop re-checks the shutdown flag when idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Binds the relay listener.
///
/// # Errors
///
/// Returns an error if the address cannot be bound (port in use, missing
/// permission).
pub async fn bind_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {addr}"))
}

/// Accepts connections on `listener` until `running` is cleared.
pub async fn serve(
    listener: TcpListener,
    config: Arc<RelayConfig>,
    dialer: Arc<dyn GatewayDialer>,
    registry: SessionRegistry,
    running: Arc<AtomicBool>,
) {
    let ctx = ConnectionContext {
        config,
        dialer,
        registry: registry.clone(),
    };

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the flag even when idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("could not set TCP_NODELAY for {peer}: {e}");
                }
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_client(stream, peer, ctx).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    let live = registry.snapshot();
    if live.is_empty() {
        info!("no sessions live at shutdown");
    } else {
        info!("{} session(s) live at shutdown", live.len());
        for entry in live {
            info!(
                "  session {} from {} (connected {:?} ago)",
                entry.id,
                entry.peer,
                entry.connected_at.elapsed()
            );
        }
    }
}

/// Binds `config.listen_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(
    config: RelayConfig,
    dialer: Arc<dyn GatewayDialer>,
    registry: SessionRegistry,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = bind_listener(config.listen_addr).await?;
    info!("relay listening on {}", config.listen_addr);
    serve(listener, Arc::new(config), dialer, registry, running).await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

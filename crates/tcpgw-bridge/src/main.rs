//! tcpgw relay: entry point.
//!
//! This binary accepts plain TCP connections from clients that cannot open a
//! secure WebSocket themselves, and opens the WebSocket to the gateway on
//! their behalf.  Each client speaks newline-delimited JSON; control frames
//! (`"op": -1`) steer the relay, everything else is passed through.
//!
//! # Usage
//!
//! ```text
//! tcpgw-bridge [OPTIONS]
//!
//! Options:
//!   --bind <IP>                 Interface for both listeners [default: 0.0.0.0]
//!   --port <PORT>               Relay (TCP) port [default: 8081]
//!   --status-port <PORT>        HTTP status port [default: 8080]
//!   --no-status                 Do not serve the status endpoint
//!   --connect-timeout <SECS>    Gateway connect timeout [default: 30]
//!   --close-timeout <SECS>      Gateway close / client drain timeout [default: 5]
//!   --max-frame-bytes <BYTES>   Largest client frame, 0 = unlimited [default: 1048576]
//!   --client-queue <FRAMES>     Outbound queue per client [default: 256]
//!   --config <PATH>             TOML configuration file
//!   --log-level <LEVEL>         Default log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Environment variable overrides
//!
//! Every flag can also be set through the environment.  Precedence, highest
//! first: command line, environment, config file, built-in default.
//!
//! | Variable                | Flag                |
//! |-------------------------|---------------------|
//! | `TCPGW_BIND`            | `--bind`            |
//! | `TCPGW_PORT`            | `--port`            |
//! | `TCPGW_STATUS_PORT`     | `--status-port`     |
//! | `TCPGW_NO_STATUS`       | `--no-status`       |
//! | `TCPGW_CONNECT_TIMEOUT` | `--connect-timeout` |
//! | `TCPGW_CLOSE_TIMEOUT`   | `--close-timeout`   |
//! | `TCPGW_MAX_FRAME_BYTES` | `--max-frame-bytes` |
//! | `TCPGW_CLIENT_QUEUE`    | `--client-queue`    |
//! | `TCPGW_CONFIG`          | `--config`          |
//! | `TCPGW_LOG`             | `--log-level`       |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tcpgw_bridge::application::SessionRegistry;
use tcpgw_bridge::domain::config::{DEFAULT_RELAY_PORT, DEFAULT_STATUS_PORT};
use tcpgw_bridge::domain::{frame_limit, FileConfig, RelayConfig};
use tcpgw_bridge::infrastructure::{install_tls_provider, run_server, run_status_server, WsDialer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP-to-WebSocket relay for clients that cannot speak TLS WebSocket.
///
/// Every value is optional here so that an unset flag can fall through to
/// the config file before the built-in default applies.
#[derive(Debug, Parser)]
#[command(
    name = "tcpgw-bridge",
    about = "Relay newline-delimited JSON over TCP to a WebSocket gateway",
    version
)]
struct Cli {
    /// IP address both listeners bind to.
    ///
    /// `0.0.0.0` accepts connections on every interface; `127.0.0.1` only
    /// from this machine.
    #[arg(long, env = "TCPGW_BIND")]
    bind: Option<String>,

    /// TCP port relay clients connect to.
    #[arg(long, env = "TCPGW_PORT")]
    port: Option<u16>,

    /// HTTP port of the status endpoint.
    #[arg(long, env = "TCPGW_STATUS_PORT")]
    status_port: Option<u16>,

    /// Do not serve the status endpoint.
    #[arg(long, env = "TCPGW_NO_STATUS")]
    no_status: bool,

    /// Seconds allowed for opening a gateway connection.
    #[arg(long, env = "TCPGW_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Seconds allowed for a gateway close handshake or a client drain.
    #[arg(long, env = "TCPGW_CLOSE_TIMEOUT")]
    close_timeout: Option<u64>,

    /// Largest accepted client frame in bytes; 0 disables the limit.
    #[arg(long, env = "TCPGW_MAX_FRAME_BYTES")]
    max_frame_bytes: Option<usize>,

    /// Frames that may wait in each client's outbound queue.
    #[arg(long, env = "TCPGW_CLIENT_QUEUE")]
    client_queue: Option<usize>,

    /// TOML configuration file.
    #[arg(long, env = "TCPGW_CONFIG")]
    config: Option<PathBuf>,

    /// Default log filter, used when `RUST_LOG` is not set.
    #[arg(long, env = "TCPGW_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Reads and parses `--config`, or returns an empty file config.
    fn load_file_config(&self) -> anyhow::Result<FileConfig> {
        let Some(path) = &self.config else {
            return Ok(FileConfig::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        FileConfig::from_toml_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// The log filter to use when `RUST_LOG` is unset.
    fn log_level(&self, file: &FileConfig) -> String {
        self.log_level
            .clone()
            .or_else(|| file.log_level.clone())
            .unwrap_or_else(|| "info".to_string())
    }

    /// Merges the flags with `file` and the defaults into a validated
    /// [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address or the merged
    /// configuration fails validation.
    fn into_relay_config(self, file: &FileConfig) -> anyhow::Result<RelayConfig> {
        let defaults = RelayConfig::default();

        let bind: IpAddr = match &self.bind {
            Some(text) => text
                .parse()
                .with_context(|| format!("invalid bind address: '{text}'"))?,
            None => file.bind.unwrap_or(defaults.listen_addr.ip()),
        };
        let port = self.port.or(file.port).unwrap_or(DEFAULT_RELAY_PORT);
        let status_port = self
            .status_port
            .or(file.status_port)
            .unwrap_or(DEFAULT_STATUS_PORT);
        let status_enabled = !self.no_status && file.status_enabled.unwrap_or(true);

        let secs = |flag: Option<u64>, file: Option<u64>, default: Duration| {
            flag.or(file).map(Duration::from_secs).unwrap_or(default)
        };

        let config = RelayConfig {
            listen_addr: SocketAddr::new(bind, port),
            status_addr: status_enabled.then(|| SocketAddr::new(bind, status_port)),
            connect_timeout: secs(
                self.connect_timeout,
                file.connect_timeout_secs,
                defaults.connect_timeout,
            ),
            close_timeout: secs(
                self.close_timeout,
                file.close_timeout_secs,
                defaults.close_timeout,
            ),
            max_frame_len: self
                .max_frame_bytes
                .or(file.max_frame_bytes)
                .map_or(defaults.max_frame_len, frame_limit),
            client_queue: self
                .client_queue
                .or(file.client_queue)
                .unwrap_or(defaults.client_queue),
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the optional config file is read.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins when set;
///    otherwise `--log-level` (or the file's `log_level`, or `info`) applies.
/// 3. The merged [`RelayConfig`] is built and validated.
/// 4. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
/// 5. The status endpoint is spawned unless disabled.
/// 6. [`run_server`] accepts relay clients until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.load_file_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    let level = cli.log_level(&file);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = cli.into_relay_config(&file)?;
    info!(
        "tcpgw relay starting: relay={}, status={}",
        config.listen_addr,
        config
            .status_addr
            .map_or_else(|| "disabled".to_string(), |a| a.to_string())
    );

    install_tls_provider();

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Status endpoint ───────────────────────────────────────────────────────
    let status_task = config.status_addr.map(|addr| {
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            if let Err(e) = run_status_server(addr, running).await {
                warn!("status endpoint stopped: {e:#}");
            }
        })
    });

    // ── Relay ─────────────────────────────────────────────────────────────────
    let dialer = Arc::new(WsDialer::new(config.close_timeout));
    run_server(config, dialer, SessionRegistry::new(), running).await?;

    if let Some(task) = status_task {
        let _ = task.await;
    }
    info!("tcpgw relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

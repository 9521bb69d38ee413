//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is assembled at startup from three layers, highest priority first:
//!
//! 1. Command-line flags (and their `TCPGW_*` environment fallbacks).
//! 2. An optional TOML file ([`FileConfig`]).
//! 3. The defaults in [`RelayConfig::default`].
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads in here) lets tests build whatever configuration they need directly.
//! Reading the file from disk happens in `main.rs`; this module only parses
//! text that has already been loaded.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use tcpgw_core::protocol::DEFAULT_MAX_FRAME_LEN;
use thiserror::Error;

/// Default TCP port for relay clients.
pub const DEFAULT_RELAY_PORT: u16 = 8081;
/// Default HTTP port for the status endpoint.
pub const DEFAULT_STATUS_PORT: u16 = 8080;
/// Default upper bound on opening a gateway connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time allowed for a gateway close handshake or writer drain.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default capacity of each client's outbound frame queue.
pub const DEFAULT_CLIENT_QUEUE: usize = 256;

/// Errors raised while building or validating a [`RelayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("relay and status endpoint cannot share {0}")]
    PortConflict(SocketAddr),

    #[error("client queue capacity must be at least 1")]
    EmptyClientQueue,

    #[error("{name} must be greater than zero")]
    ZeroTimeout { name: &'static str },
}

/// All runtime configuration for the relay.
///
/// Build this once at startup and wrap it in an `Arc` so every session task
/// can share it.
///
/// # Example
///
/// ```rust
/// use tcpgw_bridge::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 8081);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Where relay clients connect (plain TCP, newline-delimited JSON).
    pub listen_addr: SocketAddr,

    /// Where the HTTP status endpoint listens.  `None` disables it.
    pub status_addr: Option<SocketAddr>,

    /// Upper bound on opening a gateway connection, handshake included.
    pub connect_timeout: Duration,

    /// How long a gateway close handshake (or a client writer drain) may take
    /// before the task is aborted.
    pub close_timeout: Duration,

    /// Largest accepted client frame in bytes.  `None` means unlimited.
    pub max_frame_len: Option<usize>,

    /// Capacity of the per-client outbound queue.  When it is full, the
    /// gateway pump waits, which in turn stops reading from the gateway.
    pub client_queue: usize,
}

impl Default for RelayConfig {
    /// | Field           | Default        |
    /// |-----------------|----------------|
    /// | listen_addr     | `0.0.0.0:8081` |
    /// | status_addr     | `0.0.0.0:8080` |
    /// | connect_timeout | 30 seconds     |
    /// | close_timeout   | 5 seconds      |
    /// | max_frame_len   | 1 MiB          |
    /// | client_queue    | 256            |
    fn default() -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            listen_addr: SocketAddr::new(any, DEFAULT_RELAY_PORT),
            status_addr: Some(SocketAddr::new(any, DEFAULT_STATUS_PORT)),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_frame_len: Some(DEFAULT_MAX_FRAME_LEN),
            client_queue: DEFAULT_CLIENT_QUEUE,
        }
    }
}

impl RelayConfig {
    /// Checks the settings that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::PortConflict`] if the status endpoint would bind the
    ///   same port as the relay on an overlapping interface.
    /// - [`ConfigError::EmptyClientQueue`] if `client_queue` is zero.
    /// - [`ConfigError::ZeroTimeout`] if either timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(status) = self.status_addr {
            if status.port() == self.listen_addr.port() && addrs_overlap(status, self.listen_addr) {
                return Err(ConfigError::PortConflict(status));
            }
        }
        if self.client_queue == 0 {
            return Err(ConfigError::EmptyClientQueue);
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "connect timeout",
            });
        }
        if self.close_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "close timeout",
            });
        }
        Ok(())
    }
}

/// Two listeners collide when they use the same IP family and either binds
/// the wildcard address or both bind the same address.
fn addrs_overlap(a: SocketAddr, b: SocketAddr) -> bool {
    if a.is_ipv4() != b.is_ipv4() {
        return false;
    }
    a.ip().is_unspecified() || b.ip().is_unspecified() || a.ip() == b.ip()
}

/// Schema of the optional TOML configuration file.
///
/// Every key is optional; anything left out falls through to the built-in
/// default.  Explicit command-line flags override whatever is set here.
///
/// ```toml
/// bind = "127.0.0.1"
/// port = 9000
/// status_port = 9001
/// status_enabled = true
/// connect_timeout_secs = 10
/// close_timeout_secs = 2
/// max_frame_bytes = 65536   # 0 = unlimited
/// client_queue = 128
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub status_port: Option<u16>,
    pub status_enabled: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub close_timeout_secs: Option<u64>,
    pub max_frame_bytes: Option<usize>,
    pub client_queue: Option<usize>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Parses the TOML text of a configuration file.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Maps the "0 means unlimited" convention of the CLI and file onto
/// [`RelayConfig::max_frame_len`].
pub fn frame_limit(max_frame_bytes: usize) -> Option<usize> {
    (max_frame_bytes != 0).then_some(max_frame_bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relay_port_is_8081() {
        // Arrange / Act
        let cfg = RelayConfig::default();
        // Assert
        assert_eq!(cfg.listen_addr.port(), 8081);
    }

    #[test]
    fn test_default_status_port_is_8080() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.status_addr.map(|a| a.port()), Some(8080));
    }

    #[test]
    fn test_default_timeouts_and_limits() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.close_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_frame_len, Some(1024 * 1024));
        assert_eq!(cfg.client_queue, 256);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_same_port_on_wildcard_is_rejected() {
        // Arrange: status endpoint moved onto the relay port
        let cfg = RelayConfig {
            status_addr: Some("0.0.0.0:8081".parse().unwrap()),
            ..RelayConfig::default()
        };

        // Act
        let result = cfg.validate();

        // Assert
        assert!(matches!(result, Err(ConfigError::PortConflict(_))));
    }

    #[test]
    fn test_same_port_on_distinct_addresses_is_allowed() {
        let cfg = RelayConfig {
            listen_addr: "127.0.0.1:9000".parse().unwrap(),
            status_addr: Some("127.0.0.2:9000".parse().unwrap()),
            ..RelayConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_same_port_is_allowed_when_status_disabled() {
        let cfg = RelayConfig {
            status_addr: None,
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            ..RelayConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_client_queue_is_rejected() {
        let cfg = RelayConfig {
            client_queue: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyClientQueue)));
    }

    #[test]
    fn test_zero_connect_timeout_is_rejected() {
        let cfg = RelayConfig {
            connect_timeout: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroTimeout { name: "connect timeout" })
        ));
    }

    #[test]
    fn test_file_config_parses_every_key() {
        // Arrange
        let text = r#"
            bind = "127.0.0.1"
            port = 9000
            status_port = 9001
            status_enabled = false
            connect_timeout_secs = 10
            close_timeout_secs = 2
            max_frame_bytes = 0
            client_queue = 16
            log_level = "debug"
        "#;

        // Act
        let file = FileConfig::from_toml_str(text).unwrap();

        // Assert
        assert_eq!(file.bind, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(file.port, Some(9000));
        assert_eq!(file.status_port, Some(9001));
        assert_eq!(file.status_enabled, Some(false));
        assert_eq!(file.connect_timeout_secs, Some(10));
        assert_eq!(file.close_timeout_secs, Some(2));
        assert_eq!(file.max_frame_bytes, Some(0));
        assert_eq!(file.client_queue, Some(16));
        assert_eq!(file.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_empty_file_config_is_all_none() {
        let file = FileConfig::from_toml_str("").unwrap();
        assert_eq!(file, FileConfig::default());
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        let result = FileConfig::from_toml_str("prot = 9000");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_wrong_type_in_file_is_rejected() {
        let result = FileConfig::from_toml_str("port = \"nine thousand\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_limit_zero_means_unlimited() {
        assert_eq!(frame_limit(0), None);
        assert_eq!(frame_limit(4096), Some(4096));
    }
}

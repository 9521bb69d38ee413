//! Domain layer for tcpgw-bridge.
//!
//! The domain layer contains plain types with no dependencies on I/O,
//! networking, or the async runtime.  Session identity, session states, and
//! the wire-level control messages live one level further down, in
//! `tcpgw-core`, because they are shared with anything else that speaks the
//! relay protocol.
//!
//! # What belongs here?
//!
//! - Runtime configuration and its validation rules
//! - The schema of the configuration file
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or WebSocket types
//! - Reading files or environment variables

pub mod config;

pub use config::{frame_limit, ConfigError, FileConfig, RelayConfig};

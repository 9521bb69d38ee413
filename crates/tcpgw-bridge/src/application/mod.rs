//! Application layer for tcpgw-bridge.
//!
//! The application layer knows *what* the relay does with each frame, but
//! delegates *how* bytes move to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - The session state machine: HELLO, connect, pass-through, filter updates,
//!   teardown
//! - The ports the session talks through (gateway dialer, client queue)
//! - The registry of live sessions
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or performing WebSocket handshakes (infrastructure)
//! - Splitting bytes into frames (`tcpgw-core`)

pub mod ports;
pub mod registry;
pub mod session;

pub use ports::{
    ClientGone, ClientHandle, Delivery, GatewayDialer, GatewayError, GatewayLink, SessionSignal,
    SharedFilter, UpstreamSink, WriterCommand,
};
pub use registry::{RegistrySlot, SessionEntry, SessionRegistry};
pub use session::{Session, SessionSettings};

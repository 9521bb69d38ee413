//! # tcpgw-core
//!
//! Shared library for the tcpgw relay containing the line framer, the JSON
//! control envelope codec, and the upstream event filter.
//!
//! This crate has zero dependencies on sockets, async runtimes, or WebSocket
//! libraries.  Everything here operates on byte slices and strings so it can
//! be tested exhaustively without a network.
//!
//! # Architecture overview (for beginners)
//!
//! tcpgw lets a client that can only open a plain TCP socket (an old phone, a
//! microcontroller, a legacy desktop app) talk to a WebSocket gateway.  The
//! client sends newline-delimited JSON over TCP; the relay opens the secure
//! WebSocket on the client's behalf and shuttles frames in both directions.
//!
//! This crate (`tcpgw-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes on the TCP stream become frames, and how a
//!   frame is classified as either a control message (`op == -1`) or an opaque
//!   payload for the gateway.
//!
//! - **`filter`** – Which upstream events the client wants to see.
//!
//! - **`domain`** – Session identity and the session lifecycle states.

pub mod domain;
pub mod filter;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `tcpgw_core::LineFramer` instead of `tcpgw_core::protocol::framer::LineFramer`.
pub use domain::session_id::SessionId;
pub use domain::session_state::SessionState;
pub use filter::{event_type_of, should_forward, EventFilter};
pub use protocol::control::{ControlError, ControlMessage, DecodeError, Envelope, CONTROL_OP};
pub use protocol::framer::{FrameError, LineFramer};

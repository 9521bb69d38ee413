//! Domain entities for the tcpgw relay.
//!
//! This module contains pure types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from network libraries, async runtimes, or I/O.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! For the relay, the domain is small: how a session is identified, and which
//! lifecycle states it moves through.

/// Opaque per-session identifier.
pub mod session_id;

/// Session lifecycle states and their legal transitions.
pub mod session_state;

pub use session_id::SessionId;
pub use session_state::SessionState;

//! Infrastructure layer for tcpgw-bridge.
//!
//! The infrastructure layer handles all I/O: the client-facing TCP listener,
//! the outbound WebSocket to each gateway, and the HTTP status endpoint.
//!
//! # Responsibilities
//!
//! - Binding the relay listener and spawning a task per connection
//! - Reading client bytes and owning the single writer for each client
//! - Opening gateway WebSockets (ws:// and wss://) and pumping their frames
//! - Serving the status endpoint
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Deciding what a frame means (that is the application layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod client_conn;
pub mod gateway_conn;
pub mod status_server;
pub mod tcp_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use client_conn::{handle_client, ConnectionContext};
pub use gateway_conn::{install_tls_provider, WsDialer};
pub use status_server::run_status_server;
pub use tcp_server::{bind_listener, run_server, serve};

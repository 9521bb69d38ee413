//! tcpgw-bridge library crate.
//!
//! A relay that lets clients limited to plain TCP (old phones, embedded
//! devices, legacy desktop programs) talk to a secure WebSocket gateway.
//! Clients speak newline-delimited JSON to the relay; the relay opens the
//! WebSocket on their behalf and moves frames in both directions.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client (newline-delimited JSON over TCP)
//!         ↕
//! [tcpgw-bridge]
//!   ├── domain/           RelayConfig, FileConfig
//!   ├── application/      Session state machine, ports, session registry
//!   └── infrastructure/
//!         ├── tcp_server/     TCP accept loop
//!         ├── client_conn/    Per-client read loop and writer task
//!         ├── gateway_conn/   WebSocket to the gateway (tokio-tungstenite)
//!         └── status_server/  HTTP status endpoint (axum)
//!         ↕
//! Gateway (JSON over WebSocket, usually wss://)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `tcpgw-core`, and talks to the
//!   network only through the traits in `application::ports`.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite`, and `axum`.
//!
//! # For beginners: why this structure?
//!
//! The session logic (what happens on `GATEWAY_CONNECT`, when a payload
//! arrives before a gateway is open, how teardown is ordered) is the part
//! most worth testing.  Keeping it behind small traits means those tests run
//! against in-memory doubles, with no sockets and no timing flakiness.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: the session state machine and its ports.
pub mod application;

/// Infrastructure layer: TCP listener, WebSocket connector, status endpoint.
pub mod infrastructure;

//! Session lifecycle states.
//!
//! ```text
//!             GATEWAY_CONNECT            open() ok
//! HELLO_SENT ─────────────────▶ AWAITING_GATEWAY ─────────▶ CONNECTED
//!     │                           │   ▲   │ open() failed      │
//!     │                           │   └───┘                    │ GATEWAY_CONNECT
//!     │                           │   ◀────────────────────────┘ (replace gateway)
//!     │                           │                            │
//!     └───────────────────────────┴──────────┬─────────────────┘
//!                                            ▼ disconnect / EOF / upstream closed
//!                                         CLOSING ─────▶ CLOSED
//! ```
//!
//! Once `CLOSING` is entered the session never returns to
//! `AWAITING_GATEWAY` or `CONNECTED`.

use std::fmt;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// `GATEWAY_HELLO` has been queued; nothing read from the client yet.
    HelloSent,
    /// A connect was requested (or failed); no live gateway.
    AwaitingGateway,
    /// A gateway connection is open and its pump is running.
    Connected,
    /// Teardown in progress.
    Closing,
    /// Teardown finished.  Terminal.
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (HelloSent, AwaitingGateway)
                | (AwaitingGateway, AwaitingGateway)
                | (AwaitingGateway, Connected)
                | (Connected, AwaitingGateway)
                | (HelloSent | AwaitingGateway | Connected, Closing)
                | (Closing, Closed)
        )
    }

    /// `true` for `Closing` and `Closed`.
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }

    /// Wire-style name, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::HelloSent => "HELLO_SENT",
            SessionState::AwaitingGateway => "AWAITING_GATEWAY",
            SessionState::Connected => "CONNECTED",
            SessionState::Closing => "CLOSING",
            SessionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

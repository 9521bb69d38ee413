//! Upstream event filtering.
//!
//! Gateways push many event types a constrained client never uses (presence
//! updates, typing indicators, ...).  The client names the types it wants in
//! `supported_events`; everything else is dropped at the relay so it never
//! crosses the slow link.
//!
//! # Rules
//!
//! | allowed set | frame type      | forwarded? |
//! |-------------|-----------------|------------|
//! | empty       | anything        | yes        |
//! | `{A}`       | `A`             | yes        |
//! | `{A}`       | `B`             | no         |
//! | `{A}`       | absent or `""`  | yes        |
//!
//! Frames without a type are gateway housekeeping (heartbeat acks, hello)
//! and always pass.

use std::collections::HashSet;

use serde_json::Value;
use tracing::trace;

/// Decides whether a frame of type `frame_type` should reach the client.
///
/// ```rust
/// use std::collections::HashSet;
/// use tcpgw_core::should_forward;
///
/// let allowed: HashSet<String> = ["A".to_string()].into();
/// assert!(should_forward(&allowed, Some("A")));
/// assert!(!should_forward(&allowed, Some("B")));
/// assert!(should_forward(&allowed, None));
/// assert!(should_forward(&HashSet::new(), Some("B")));
/// ```
pub fn should_forward(allowed: &HashSet<String>, frame_type: Option<&str>) -> bool {
    match frame_type {
        None | Some("") => true,
        Some(_) if allowed.is_empty() => true,
        Some(t) => allowed.contains(t),
    }
}

/// Extracts the `t` field from a raw upstream frame.
///
/// Returns `None` when the frame is not JSON, not an object, or has no string
/// `t`.  Only the type is inspected; the frame itself is forwarded untouched.
pub fn event_type_of(raw: &str) -> Option<String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(mut map)) => match map.remove("t") {
            Some(Value::String(t)) => Some(t),
            _ => None,
        },
        _ => None,
    }
}

/// The per-session allow-list of upstream event types.
///
/// An empty filter forwards everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    allowed: HashSet<String>,
}

impl EventFilter {
    /// A filter that forwards every event.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// A filter restricted to `events`.  An empty iterator means allow all.
    pub fn from_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Replaces the allow-list in place.
    pub fn replace<I, S>(&mut self, events: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = events.into_iter().map(Into::into).collect();
    }

    /// `true` when no restriction is in effect.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Number of explicitly allowed event types.
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// `true` when the allow-list is empty (same as [`Self::is_unrestricted`]).
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// See [`should_forward`].
    pub fn should_forward(&self, frame_type: Option<&str>) -> bool {
        should_forward(&self.allowed, frame_type)
    }

    /// Convenience: extract the type of `raw` and apply the filter.
    pub fn admits(&self, raw: &str) -> bool {
        if self.is_unrestricted() {
            // No need to parse the frame at all.
            return true;
        }
        let frame_type = event_type_of(raw);
        let admitted = self.should_forward(frame_type.as_deref());
        if !admitted {
            trace!("filtered upstream event {:?}", frame_type);
        }
        admitted
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

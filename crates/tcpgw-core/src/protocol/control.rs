//! JSON control envelope codec.
//!
//! Every frame on the client stream is a JSON object of the shape
//!
//! ```json
//! {"op": <integer>, "t": "<type>", "d": { ... }}
//! ```
//!
//! The relay only *interprets* frames whose `op` is the sentinel `-1`
//! ([`CONTROL_OP`]).  Those are relay-management instructions (connect,
//! disconnect, change the event filter).  Everything else, including frames
//! with no `op` at all, is opaque application payload and is forwarded to the
//! gateway verbatim.
//!
//! # Control message catalogue
//!
//! | `t`                               | direction       | `d`                          |
//! |-----------------------------------|-----------------|------------------------------|
//! | `GATEWAY_HELLO`                   | relay → client  | absent                       |
//! | `GATEWAY_CONNECT`                 | client → relay  | `{url, supported_events?}`   |
//! | `GATEWAY_DISCONNECT`              | both            | `{message}`                  |
//! | `GATEWAY_UPDATE_SUPPORTED_EVENTS` | client → relay  | `{supported_events}`         |
//! | `GATEWAY_ERROR`                   | relay → client  | `{message}`                  |

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// The `op` value that marks a frame as a relay control message.
pub const CONTROL_OP: i64 = -1;

pub const GATEWAY_HELLO: &str = "GATEWAY_HELLO";
pub const GATEWAY_CONNECT: &str = "GATEWAY_CONNECT";
pub const GATEWAY_DISCONNECT: &str = "GATEWAY_DISCONNECT";
pub const GATEWAY_UPDATE_SUPPORTED_EVENTS: &str = "GATEWAY_UPDATE_SUPPORTED_EVENTS";
pub const GATEWAY_ERROR: &str = "GATEWAY_ERROR";

// ── Error types ───────────────────────────────────────────────────────────────

/// A frame could not be decoded at all.
///
/// Non-fatal: the session logs it and drops the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// A frame was a control envelope but its contents made no sense.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control message has no string `t` field")]
    MissingType,

    #[error("unknown control message type: {0}")]
    UnknownType(String),

    #[error("invalid `d` payload for {kind}: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// A decoded frame from the client.
///
/// Holds the parsed document plus the three envelope fields pulled out of it.
/// Frames that are valid JSON but not objects (`[1,2]`, `"hi"`) decode to an
/// envelope with every field absent, which makes them pass-through payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub op: Option<i64>,
    pub t: Option<String>,
    pub d: Option<Value>,
    body: Value,
}

impl Envelope {
    /// Builds an envelope view over an already-parsed JSON document.
    pub fn from_value(body: Value) -> Self {
        let (op, t, d) = match &body {
            Value::Object(map) => (
                map.get("op").and_then(Value::as_i64),
                map.get("t").and_then(Value::as_str).map(str::to_owned),
                map.get("d").cloned(),
            ),
            _ => (None, None, None),
        };
        Self { op, t, d, body }
    }

    /// `true` when `op` is the control sentinel.
    pub fn is_control(&self) -> bool {
        self.op == Some(CONTROL_OP)
    }

    /// The full parsed document.
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Decodes one frame into an [`Envelope`].
///
/// # Errors
///
/// Returns [`DecodeError::InvalidJson`] if the bytes are not a UTF-8 JSON
/// document.
///
/// # Examples
///
/// ```rust
/// use tcpgw_core::protocol::decode;
///
/// let env = decode(br#"{"op":-1,"t":"GATEWAY_DISCONNECT"}"#).unwrap();
/// assert!(env.is_control());
///
/// let payload = decode(br#"{"op":2,"d":{"token":"abc"}}"#).unwrap();
/// assert!(!payload.is_control());
/// ```
pub fn decode(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let body: Value = serde_json::from_slice(frame)?;
    Ok(Envelope::from_value(body))
}

// ── Typed control messages ────────────────────────────────────────────────────

/// `d` payload of `GATEWAY_CONNECT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// WebSocket URL of the gateway (`wss://...` or `ws://...`).
    pub url: String,

    /// Event types to forward.  Absent (or empty) means forward everything.
    #[serde(default, alias = "supportedEvents", skip_serializing_if = "Option::is_none")]
    pub supported_events: Option<Vec<String>>,
}

/// `d` payload of `GATEWAY_UPDATE_SUPPORTED_EVENTS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedEventsUpdate {
    #[serde(alias = "supportedEvents")]
    pub supported_events: Vec<String>,
}

/// `d` payload of `GATEWAY_DISCONNECT` and `GATEWAY_ERROR`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A control-plane message, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// First frame the relay sends on every connection.
    Hello,
    /// Client asks the relay to open the gateway connection.
    Connect(ConnectRequest),
    /// Client asks the relay to close, or the relay announces closure.
    Disconnect(Notice),
    /// Client replaces the event filter.
    UpdateSupportedEvents(SupportedEventsUpdate),
    /// Relay reports a problem without closing the session.
    Error(Notice),
}

impl ControlMessage {
    /// Builds a `GATEWAY_DISCONNECT` carrying `message`.
    pub fn disconnect(message: impl Into<String>) -> Self {
        Self::Disconnect(Notice {
            message: Some(message.into()),
        })
    }

    /// Builds a `GATEWAY_ERROR` carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(Notice {
            message: Some(message.into()),
        })
    }

    /// The `t` string for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello => GATEWAY_HELLO,
            Self::Connect(_) => GATEWAY_CONNECT,
            Self::Disconnect(_) => GATEWAY_DISCONNECT,
            Self::UpdateSupportedEvents(_) => GATEWAY_UPDATE_SUPPORTED_EVENTS,
            Self::Error(_) => GATEWAY_ERROR,
        }
    }

    /// Interprets a control envelope (`op == -1`).
    ///
    /// A missing `d` is treated as an empty object, so `GATEWAY_DISCONNECT`
    /// without a payload is accepted.
    ///
    /// # Errors
    ///
    /// - [`ControlError::MissingType`] when `t` is absent or not a string.
    /// - [`ControlError::UnknownType`] for a `t` outside the catalogue.
    /// - [`ControlError::InvalidPayload`] when `d` lacks a required field.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ControlError> {
        let kind = envelope.t.as_deref().ok_or(ControlError::MissingType)?;
        let data = envelope
            .d
            .clone()
            .filter(|d| !d.is_null())
            .unwrap_or_else(|| Value::Object(Map::new()));

        match kind {
            GATEWAY_HELLO => Ok(Self::Hello),
            GATEWAY_CONNECT => parse_payload(GATEWAY_CONNECT, data).map(Self::Connect),
            GATEWAY_DISCONNECT => parse_payload(GATEWAY_DISCONNECT, data).map(Self::Disconnect),
            GATEWAY_UPDATE_SUPPORTED_EVENTS => {
                parse_payload(GATEWAY_UPDATE_SUPPORTED_EVENTS, data).map(Self::UpdateSupportedEvents)
            }
            GATEWAY_ERROR => parse_payload(GATEWAY_ERROR, data).map(Self::Error),
            other => Err(ControlError::UnknownType(other.to_owned())),
        }
    }

    /// Encodes the message as a single-line JSON envelope (no trailing `\n`).
    ///
    /// Field order is always `op`, `t`, `d`; `GATEWAY_HELLO` carries no `d`.
    ///
    /// ```rust
    /// use tcpgw_core::ControlMessage;
    ///
    /// assert_eq!(ControlMessage::Hello.encode(), r#"{"op":-1,"t":"GATEWAY_HELLO"}"#);
    /// ```
    pub fn encode(&self) -> String {
        let mut envelope = json!({ "op": CONTROL_OP, "t": self.kind() });
        let data = match self {
            Self::Hello => None,
            Self::Connect(req) => serde_json::to_value(req).ok(),
            Self::Disconnect(notice) | Self::Error(notice) => serde_json::to_value(notice).ok(),
            Self::UpdateSupportedEvents(update) => serde_json::to_value(update).ok(),
        };
        if let (Some(data), Value::Object(map)) = (data, &mut envelope) {
            map.insert("d".to_owned(), data);
        }
        envelope.to_string()
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    data: Value,
) -> Result<T, ControlError> {
    serde_json::from_value(data).map_err(|source| ControlError::InvalidPayload { kind, source })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

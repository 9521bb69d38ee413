//! Log redaction for pass-through payloads.
//!
//! Gateway identify payloads carry the client's credential as `d.token`.
//! The relay logs pass-through frames at debug level, so the credential is
//! masked in the *logged copy only*; the bytes sent upstream are untouched.

use serde_json::Value;

/// Placeholder written over redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Renders `body` for logging with `d.token` masked.
///
/// Only a `token` key directly inside the top-level `d` object is masked.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use tcpgw_core::protocol::redact_for_log;
///
/// let body = json!({"op": 2, "d": {"token": "secret"}});
/// assert_eq!(redact_for_log(&body), r#"{"op":2,"d":{"token":"[REDACTED]"}}"#);
/// ```
pub fn redact_for_log(body: &Value) -> String {
    let has_token = body
        .get("d")
        .and_then(Value::as_object)
        .is_some_and(|d| d.contains_key("token"));
    if !has_token {
        return body.to_string();
    }

    let mut copy = body.clone();
    if let Some(token) = copy.get_mut("d").and_then(|d| d.get_mut("token")) {
        *token = Value::String(REDACTED.to_owned());
    }
    copy.to_string()
}

//! Detection of HTTP requests arriving on the raw relay port.
//!
//! Health checkers and curious browsers sometimes point plain HTTP at the TCP
//! port.  Their request line is not JSON, so it would normally be dropped as a
//! malformed frame and the client would hang.  The session instead recognises
//! the request line, explains itself with a control frame, and closes.

/// Request methods from RFC 9110 plus `PATCH`.
const HTTP_METHODS: [&[u8]; 9] = [
    b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"CONNECT", b"OPTIONS", b"TRACE", b"PATCH",
];

/// `true` when the first whitespace-delimited token of `frame` is an HTTP
/// method.  Matching is case-sensitive, as methods are.
///
/// ```rust
/// use tcpgw_core::protocol::looks_like_http_request;
///
/// assert!(looks_like_http_request(b"GET /status HTTP/1.1\r"));
/// assert!(!looks_like_http_request(br#"{"op":-1}"#));
/// ```
pub fn looks_like_http_request(frame: &[u8]) -> bool {
    let first_token = frame
        .split(|b| b.is_ascii_whitespace())
        .find(|token| !token.is_empty());

    match first_token {
        Some(token) => HTTP_METHODS.contains(&token),
        None => false,
    }
}

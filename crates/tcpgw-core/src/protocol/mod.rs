//! Protocol module: line framing, the control envelope codec, and the helpers
//! the relay applies to individual frames.

pub mod control;
pub mod framer;
pub mod redact;
pub mod sniff;

pub use control::{decode, ControlError, ControlMessage, DecodeError, Envelope, CONTROL_OP};
pub use framer::{to_single_line, FrameError, LineFramer, DEFAULT_MAX_FRAME_LEN};
pub use redact::redact_for_log;
pub use sniff::looks_like_http_request;

//! RTSP protocol implementation, client side (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol: building
//! requests, parsing responses, demultiplexing the control stream, and
//! reading SDP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Once media flows over TCP, the same byte stream also carries binary
//! interleaved frames (RFC 2326 §10.12), decoded by [`MessageDecoder`].
//!
//! ## Methods the client issues
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Keepalive |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport per medium |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Destroy session |

pub mod message;
pub mod request;
pub mod response;
pub mod sdp;

pub use message::{Message, MessageDecoder};
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;

use crate::error::{ParseErrorKind, Result, SourceError};

/// Parse `Name: value` lines until the blank line ending a message head.
fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();

    for line in lines {
        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or(SourceError::parse(ParseErrorKind::InvalidHeader))?;

        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

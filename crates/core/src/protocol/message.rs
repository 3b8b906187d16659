//! Control-stream demultiplexer.
//!
//! After SETUP over TCP, one byte stream carries three kinds of units:
//!
//! ```text
//! RTSP/1.0 200 OK\r\n...\r\n\r\n[body]     ← response to our request
//! GET_PARAMETER rtsp://... RTSP/1.0\r\n...  ← request from the server
//! $ <channel:u8> <length:u16 BE> <payload>  ← interleaved RTP/RTCP
//! ```
//!
//! [`MessageDecoder`] buffers raw bytes and yields whole units; partial
//! input stays buffered until the rest arrives.

use super::request::RtspRequest;
use super::response::RtspResponse;
use crate::error::{ParseErrorKind, Result, SourceError};

/// Upper bound for a single message head plus body, or a single frame.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const INTERLEAVED_MARKER: u8 = b'$';
const INTERLEAVED_HEADER_LEN: usize = 4;

/// One decoded unit of the control stream.
#[derive(Debug)]
pub enum Message {
    Response(RtspResponse),
    Request(RtspRequest),
    Data { channel: u8, payload: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct MessageDecoder {
    buf: Vec<u8>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete unit, or `Ok(None)` if more bytes are needed.
    pub fn decode(&mut self) -> Result<Option<Message>> {
        // Stray line breaks between messages are tolerated.
        let skip = self
            .buf
            .iter()
            .take_while(|b| **b == b'\r' || **b == b'\n')
            .count();
        if skip > 0 {
            self.buf.drain(..skip);
        }

        match self.buf.first() {
            None => Ok(None),
            Some(&INTERLEAVED_MARKER) => self.decode_frame(),
            Some(_) => self.decode_text(),
        }
    }

    fn decode_frame(&mut self) -> Result<Option<Message>> {
        if self.buf.len() < INTERLEAVED_HEADER_LEN {
            return Ok(None);
        }
        let channel = self.buf[1];
        let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        let total = INTERLEAVED_HEADER_LEN + len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload = self.buf[INTERLEAVED_HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(Message::Data { channel, payload }))
    }

    fn decode_text(&mut self) -> Result<Option<Message>> {
        let Some(head_len) = find_head_end(&self.buf) else {
            if self.buf.len() > MAX_MESSAGE_SIZE {
                return Err(SourceError::parse(ParseErrorKind::TooBig));
            }
            return Ok(None);
        };

        let head = String::from_utf8_lossy(&self.buf[..head_len]).into_owned();
        let body_len = content_length(&head)?;
        let total = head_len + body_len;
        if total > MAX_MESSAGE_SIZE {
            return Err(SourceError::parse(ParseErrorKind::TooBig));
        }
        if self.buf.len() < total {
            return Ok(None);
        }

        let body = (body_len > 0)
            .then(|| String::from_utf8_lossy(&self.buf[head_len..total]).into_owned());
        self.buf.drain(..total);

        if head.starts_with("RTSP/") {
            let mut response = RtspResponse::parse(&head)?;
            response.body = body;
            Ok(Some(Message::Response(response)))
        } else {
            let mut request = RtspRequest::parse(&head)?;
            request.body = body;
            Ok(Some(Message::Request(request)))
        }
    }
}

/// Length of the head including its terminating blank line.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 4);
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
}

fn content_length(head: &str) -> Result<usize> {
    for line in head.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("Content-Length")
        {
            return value
                .trim()
                .parse()
                .map_err(|_| SourceError::parse(ParseErrorKind::InvalidContentLength));
        }
    }
    Ok(0)
}

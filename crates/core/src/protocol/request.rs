use std::fmt;

use crate::error::{ParseErrorKind, Result, SourceError};

/// Client identification sent in every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = "rtsp-source/0.1";

/// RTSP methods issued by the pull client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Teardown,
    GetParameter,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Teardown => "TEARDOWN",
            Self::GetParameter => "GET_PARAMETER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// The client builds requests with [`new`](Self::new) and
/// [`add_header`](Self::add_header); [`parse`](Self::parse) handles
/// requests the server sends back on the control connection.
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/trackID=0`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        RtspRequest {
            method: method.as_str().to_string(),
            uri: uri.to_string(),
            version: "RTSP/1.0".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace every header called `name` with a single value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Parse the head of an RTSP request (start line and headers).
    ///
    /// Expects the request line, headers, and trailing blank line.
    /// Returns [`SourceError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .ok_or(SourceError::parse(ParseErrorKind::EmptyMessage))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(SourceError::parse(ParseErrorKind::InvalidRequestLine));
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if !version.starts_with("RTSP/") {
            return Err(SourceError::parse(ParseErrorKind::InvalidRequestLine));
        }

        let headers = super::parse_header_lines(lines)?;

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
            body: None,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the CSeq header value (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// `Content-Length` is appended automatically when a body is present.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\r\n", self.method, self.uri, self.version);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
            request.push_str("\r\n");
            request.push_str(body);
        } else {
            request.push_str("\r\n");
        }
        request
    }
}

use crate::error::{ParseErrorKind, Result, SourceError};

/// An RTSP response (RFC 2326 §7).
///
/// Parsed from what the server sends, and built when the client answers
/// a server-originated request:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 OK (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 401 Unauthorized, carrying a challenge.
    pub fn unauthorized(www_authenticate: &str) -> Self {
        Self::new(401, "Unauthorized").add_header("WWW-Authenticate", www_authenticate)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Parse a response head (status line and headers).
    ///
    /// The body, if any, is attached by the caller once `Content-Length`
    /// bytes are available.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines
            .next()
            .ok_or(SourceError::parse(ParseErrorKind::EmptyMessage))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !version.starts_with("RTSP/") {
            return Err(SourceError::parse(ParseErrorKind::InvalidStatusLine));
        }
        let status_code = parts
            .next()
            .and_then(|code| code.trim().parse::<u16>().ok())
            .ok_or(SourceError::parse(ParseErrorKind::InvalidStatusLine))?;
        let status_text = parts.next().unwrap_or("").trim().to_string();

        let headers = super::parse_header_lines(lines)?;

        Ok(RtspResponse {
            status_code,
            status_text,
            headers,
            body: None,
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.get_headers(name).next()
    }

    /// Every value of a repeatable header, e.g. `WWW-Authenticate`.
    pub fn get_headers<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }
}

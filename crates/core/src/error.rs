//! Error types for the RTSP pull source.

use std::fmt;
use std::io;

/// Errors that can occur while pulling a stream.
///
/// Variants split into two classes, see [`ErrorKind::is_terminal`]:
///
/// - **Terminal**: [`InvalidSourceUrl`](Self::InvalidSourceUrl),
///   [`AuthenticationFailed`](Self::AuthenticationFailed),
///   [`CertificateMismatch`](Self::CertificateMismatch),
///   [`MalformedDescription`](Self::MalformedDescription),
///   [`SetupRejected`](Self::SetupRejected). These are configuration
///   problems; the source stops and reports them once.
/// - **Transient**: [`ConnectionLost`](Self::ConnectionLost),
///   [`Timeout`](Self::Timeout),
///   [`TransportFallbackNeeded`](Self::TransportFallbackNeeded),
///   [`UnexpectedStatus`](Self::UnexpectedStatus),
///   [`Parse`](Self::Parse). The supervisor closes the session and
///   reconnects.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The configured URL could not be parsed or has an unsupported scheme.
    #[error("invalid source URL: {0}")]
    InvalidSourceUrl(String),

    /// A configuration field other than the URL is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server kept challenging after one authenticated retry, or
    /// challenged while no credentials are configured.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The TLS peer certificate does not hash to the pinned fingerprint.
    #[error("server certificate fingerprint does not match {expected}")]
    CertificateMismatch { expected: String },

    /// The DESCRIBE body has no playable media or could not be parsed.
    #[error("malformed session description: {0}")]
    MalformedDescription(String),

    /// The server declined a SETUP request.
    #[error("SETUP rejected for {control}: {status} {reason}")]
    SetupRejected {
        control: String,
        status: u16,
        reason: String,
    },

    /// Any other non-success status, e.g. a PLAY rejecting the Range.
    #[error("{method} failed: {status} {reason}")]
    UnexpectedStatus {
        method: &'static str,
        status: u16,
        reason: String,
    },

    /// Connection refused, reset, or closed by the peer.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// No data or no write progress within the configured duration.
    #[error("{0} timed out")]
    Timeout(TimeoutKind),

    /// UDP was tried without a configured preference and did not work;
    /// the next attempt must use TCP-interleaved transport.
    #[error("UDP transport unusable, falling back to TCP: {0}")]
    TransportFallbackNeeded(String),

    /// The server sent a message that is not valid RTSP.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The source was asked to stop while this operation was in flight.
    #[error("cancelled")]
    Cancelled,

    /// [`Source::start`](crate::Source::start) was called while already running.
    #[error("source already running")]
    AlreadyRunning,
}

/// Which I/O direction or phase hit its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Connect,
    Read,
    Write,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was not a number.
    InvalidContentLength,
    /// A message or interleaved frame exceeded the size bound.
    TooBig,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
            Self::TooBig => write!(f, "message too big"),
        }
    }
}

/// Copyable classification of a [`SourceError`], kept as the
/// "last error" observability field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidSourceUrl,
    InvalidConfig,
    AuthenticationFailed,
    CertificateMismatch,
    MalformedDescription,
    SetupRejected,
    UnexpectedStatus,
    ConnectionLost,
    Timeout,
    TransportFallbackNeeded,
    Parse,
    Cancelled,
    AlreadyRunning,
}

impl ErrorKind {
    /// Whether the supervisor must stop instead of reconnecting.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::InvalidSourceUrl
                | Self::InvalidConfig
                | Self::AuthenticationFailed
                | Self::CertificateMismatch
                | Self::MalformedDescription
                | Self::SetupRejected
        )
    }
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSourceUrl(_) => ErrorKind::InvalidSourceUrl,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::CertificateMismatch { .. } => ErrorKind::CertificateMismatch,
            Self::MalformedDescription(_) => ErrorKind::MalformedDescription,
            Self::SetupRejected { .. } => ErrorKind::SetupRejected,
            Self::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            Self::ConnectionLost(_) => ErrorKind::ConnectionLost,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::TransportFallbackNeeded(_) => ErrorKind::TransportFallbackNeeded,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        Self::Parse { kind }
    }

    /// Map an I/O error from a write path, where a stalled socket
    /// surfaces as `WouldBlock`/`TimedOut`.
    pub(crate) fn from_write(err: io::Error) -> Self {
        if is_timeout(&err) {
            Self::Timeout(TimeoutKind::Write)
        } else {
            Self::ConnectionLost(err.to_string())
        }
    }
}

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        if is_timeout(&err) {
            Self::Timeout(TimeoutKind::Read)
        } else {
            Self::ConnectionLost(err.to_string())
        }
    }
}

/// Socket timeouts show up as `WouldBlock` on Unix and `TimedOut` on Windows.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Convenience alias for `Result<T, SourceError>`.
pub type Result<T> = std::result::Result<T, SourceError>;

//! Negotiated RTSP session, client side (RFC 2326 §3, §12.37).
//!
//! A session exists from the first successful SETUP until TEARDOWN or
//! connection loss. It records:
//!
//! - The server-assigned session ID, echoed in every later request.
//! - The session timeout (default 60s, per RFC 2326 §12.37); the client
//!   must send something before it expires.
//! - One [`SessionMedia`] per set-up medium with its negotiated transport.
//! - The `Range` the server applied to PLAY.
//!
//! A [`Session`] is handed to [`Parent::on_ready`](crate::Parent::on_ready)
//! and is read-only afterwards.

pub mod transport;

use std::fmt;
use std::time::Duration;

use crate::media::Media;
use crate::relay::PacketKind;

pub use transport::TransportHeader;

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Floor for the keepalive period, whatever timeout the server announces.
const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Lower transport in use for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Udp,
    Tcp,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Where one medium's RTP and RTCP travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedTransport {
    Udp {
        client_rtp_port: u16,
        client_rtcp_port: u16,
        /// Unknown when the server omits `server_port`.
        server_rtp_port: Option<u16>,
        server_rtcp_port: Option<u16>,
    },
    Tcp {
        rtp_channel: u8,
        rtcp_channel: u8,
    },
}

/// A set-up medium.
#[derive(Debug, Clone)]
pub struct SessionMedia {
    pub media: Media,
    /// Absolute control URL the SETUP was sent to.
    pub control_url: String,
    pub transport: NegotiatedTransport,
    /// SSRC announced by the server, if any.
    pub ssrc: Option<u32>,
}

/// An established session, as of a successful PLAY.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub timeout: Duration,
    /// Base URL control attributes were resolved against.
    pub base_url: String,
    pub medias: Vec<SessionMedia>,
    /// `Range` value reported by (or requested from) the server.
    pub range: Option<String>,
}

impl Session {
    pub fn transport_mode(&self) -> TransportMode {
        match self.medias.first().map(|m| m.transport) {
            Some(NegotiatedTransport::Tcp { .. }) => TransportMode::Tcp,
            _ => TransportMode::Udp,
        }
    }

    /// Period for OPTIONS keepalives and receiver reports: half the
    /// session timeout.
    pub fn keepalive_interval(&self) -> Duration {
        (self.timeout / 2).max(MIN_KEEPALIVE_INTERVAL)
    }

    /// Medium index and packet kind for an interleaved channel.
    pub fn route_channel(&self, channel: u8) -> Option<(usize, PacketKind)> {
        self.medias
            .iter()
            .enumerate()
            .find_map(|(index, media)| match media.transport {
                NegotiatedTransport::Tcp { rtp_channel, .. } if rtp_channel == channel => {
                    Some((index, PacketKind::Rtp))
                }
                NegotiatedTransport::Tcp { rtcp_channel, .. } if rtcp_channel == channel => {
                    Some((index, PacketKind::Rtcp))
                }
                _ => None,
            })
    }
}

/// Split a `Session` header value such as `12345678;timeout=60`.
///
/// A missing or invalid timeout yields `None`.
pub fn parse_session_header(value: &str) -> (String, Option<Duration>) {
    let mut parts = value.split(';');
    let id = parts.next().unwrap_or("").trim().to_string();
    let timeout = parts
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("timeout"))
        .and_then(|(_, v)| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    (id, timeout)
}

//! Media descriptions announced by the server.
//!
//! DESCRIBE returns one `m=` section per elementary stream; each becomes a
//! [`Media`] holding the RTP [`Format`]s it may carry.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! with a payload type that selects one of the medium's formats. Static
//! payload types (0–95) have fixed meanings from RFC 3551; dynamic ones
//! (96–127) are bound by an `a=rtpmap` line.

pub mod rtp;

use std::fmt;

/// First dynamic RTP payload type (RFC 3551 §3).
pub const DYNAMIC_PAYLOAD_TYPE_START: u8 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Application,
}

impl MediaKind {
    pub fn from_sdp(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "application" => Some(Self::Application),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// One RTP payload format of a medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub payload_type: u8,
    /// Encoding name, upper-cased (e.g. `H264`, `PCMA`, `MPEG4-GENERIC`).
    pub encoding: String,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    pub channels: Option<u16>,
    /// Raw `a=fmtp` parameters, if announced.
    pub fmtp: Option<String>,
}

impl Format {
    /// Format implied by a static payload type, if it has one.
    pub fn from_static(payload_type: u8) -> Option<Self> {
        let (encoding, clock_rate, channels) = match payload_type {
            0 => ("PCMU", 8000, Some(1)),
            3 => ("GSM", 8000, Some(1)),
            4 => ("G723", 8000, Some(1)),
            8 => ("PCMA", 8000, Some(1)),
            9 => ("G722", 8000, Some(1)),
            10 => ("L16", 44100, Some(2)),
            11 => ("L16", 44100, Some(1)),
            14 => ("MPA", 90000, None),
            26 => ("JPEG", 90000, None),
            32 => ("MPV", 90000, None),
            33 => ("MP2T", 90000, None),
            _ => return None,
        };
        Some(Self {
            payload_type,
            encoding: encoding.to_string(),
            clock_rate,
            channels,
            fmtp: None,
        })
    }

    /// Parse the value of `a=rtpmap:<pt> <encoding>/<clock>[/<channels>]`.
    pub fn from_rtpmap(value: &str) -> Option<Self> {
        let (pt, rest) = value.trim().split_once(' ')?;
        let payload_type: u8 = pt.parse().ok()?;
        let mut parts = rest.trim().split('/');
        let encoding = parts.next()?.trim();
        if encoding.is_empty() {
            return None;
        }
        let clock_rate: u32 = parts.next()?.trim().parse().ok()?;
        let channels = parts.next().and_then(|c| c.trim().parse().ok());

        Some(Self {
            payload_type,
            encoding: encoding.to_ascii_uppercase(),
            clock_rate,
            channels,
            fmtp: None,
        })
    }
}

/// An announced elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    /// Raw `a=control` value; empty when absent.
    pub control: String,
    pub formats: Vec<Format>,
}

impl Media {
    pub fn format(&self, payload_type: u8) -> Option<&Format> {
        self.formats.iter().find(|f| f.payload_type == payload_type)
    }

    /// `H264/90000, PCMA/8000` style summary for logs.
    pub fn codecs(&self) -> String {
        self.formats
            .iter()
            .map(|f| format!("{}/{}", f.encoding, f.clock_rate))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

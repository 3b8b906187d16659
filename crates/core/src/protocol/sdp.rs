//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Reads the body of a DESCRIBE response into the list of playable media:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 0 0 IN IP4 127.0.0.1                     ← origin
//! s=Stream                                      ← session name
//! a=control:*                                   ← aggregate control
//! m=video 0 RTP/AVP 96                          ← media description
//! a=rtpmap:96 H264/90000                        ← codec/clock rate
//! a=fmtp:96 packetization-mode=1                ← codec parameters
//! a=control:trackID=0                           ← per-medium control URL
//! ```
//!
//! A medium is playable when it uses an RTP profile and at least one of its
//! payload types is recognized (static, or bound by `a=rtpmap`).

use sdp_types::Attribute;
use tracing::{debug, warn};

use crate::error::{Result, SourceError};
use crate::media::{DYNAMIC_PAYLOAD_TYPE_START, Format, Media, MediaKind};

/// Parsed session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub session_name: String,
    /// Session-level `a=control`; empty when absent.
    pub control: String,
    pub medias: Vec<Media>,
}

/// Parse a DESCRIBE body.
///
/// Fails with [`SourceError::MalformedDescription`] when the body is not
/// SDP or no medium is playable.
pub fn parse(body: &str) -> Result<SessionDescription> {
    let sdp = sdp_types::Session::parse(body.as_bytes())
        .map_err(|e| malformed(format!("invalid SDP: {e}")))?;

    if sdp.medias.is_empty() {
        return Err(malformed("no media sections".to_string()));
    }

    let medias: Vec<Media> = sdp.medias.iter().filter_map(playable).collect();
    if medias.is_empty() {
        return Err(malformed("no playable media".to_string()));
    }

    Ok(SessionDescription {
        control: attribute(&sdp.attributes, "control")
            .unwrap_or("")
            .trim()
            .to_string(),
        session_name: sdp.session_name,
        medias,
    })
}

fn attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a str> {
    attribute_values(attributes, name).next()
}

fn attribute_values<'a, 'n>(
    attributes: &'a [Attribute],
    name: &'n str,
) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
    attributes
        .iter()
        .filter(move |a| a.attribute == name)
        .filter_map(|a| a.value.as_deref())
}

/// Resolve the formats of a medium; `None` if it cannot be played.
fn playable(m: &sdp_types::Media) -> Option<Media> {
    let Some(kind) = MediaKind::from_sdp(&m.media) else {
        warn!(kind = %m.media, "skipping unsupported media kind");
        return None;
    };
    if !m.proto.starts_with("RTP/") {
        warn!(kind = %m.media, proto = %m.proto, "skipping non-RTP medium");
        return None;
    }

    let mut formats = Vec::new();
    for pt in m.fmt.split_whitespace().filter_map(|pt| pt.parse::<u8>().ok()) {
        let format = attribute_values(&m.attributes, "rtpmap")
            .filter_map(Format::from_rtpmap)
            .find(|f| f.payload_type == pt)
            .or_else(|| {
                (pt < DYNAMIC_PAYLOAD_TYPE_START)
                    .then(|| Format::from_static(pt))
                    .flatten()
            });
        let Some(mut format) = format else {
            debug!(payload_type = pt, "ignoring unrecognized payload type");
            continue;
        };
        format.fmtp = attribute_values(&m.attributes, "fmtp").find_map(|value| {
            let (fpt, params) = value.trim().split_once(' ')?;
            (fpt.parse::<u8>().ok()? == pt).then(|| params.trim().to_string())
        });
        formats.push(format);
    }

    if formats.is_empty() {
        warn!(%kind, "skipping medium without recognized formats");
        return None;
    }

    Some(Media {
        kind,
        control: attribute(&m.attributes, "control")
            .unwrap_or("")
            .trim()
            .to_string(),
        formats,
    })
}

/// Resolve a control attribute against the session base URL.
///
/// `*` or an empty value address the base itself; absolute URLs are used
/// verbatim; anything else is appended to the base as a path segment.
pub fn control_url(base: &str, control: &str) -> String {
    let control = control.trim();
    if control.is_empty() || control == "*" {
        return base.to_string();
    }
    if control.starts_with("rtsp://") || control.starts_with("rtsps://") {
        return control.to_string();
    }
    if let Some(path) = control.strip_prefix('/') {
        // Absolute path: keep scheme and authority of the base.
        let authority_end = base
            .find("://")
            .map(|i| i + 3)
            .and_then(|start| base[start..].find('/').map(|i| start + i))
            .unwrap_or(base.len());
        return format!("{}/{}", &base[..authority_end], path);
    }
    if base.ends_with('/') {
        format!("{base}{control}")
    } else {
        format!("{base}/{control}")
    }
}

fn malformed(reason: String) -> SourceError {
    SourceError::MalformedDescription(reason)
}

/// An RTSP `Transport` header (RFC 2326 §12.39).
///
/// Built for SETUP requests and parsed from SETUP responses.
///
/// ## Wire format example
///
/// ```text
/// Client → Server (UDP):
///   Transport: RTP/AVP;unicast;client_port=8000-8001
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001;ssrc=3A4F21C0
///
/// Client → Server (TCP-interleaved):
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeader {
    /// `RTP/AVP/TCP` rather than `RTP/AVP` or `RTP/AVP/UDP`.
    pub tcp: bool,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    pub interleaved: Option<(u8, u8)>,
    pub ssrc: Option<u32>,
    /// `source=` address the server sends from, if given.
    pub source: Option<String>,
}

impl TransportHeader {
    /// Request RTP/RTCP on a local UDP port pair.
    pub fn udp(rtp_port: u16, rtcp_port: u16) -> Self {
        Self {
            client_port: Some((rtp_port, rtcp_port)),
            ..Self::default()
        }
    }

    /// Request RTP/RTCP interleaved on the control connection.
    pub fn interleaved(rtp_channel: u8, rtcp_channel: u8) -> Self {
        Self {
            tcp: true,
            interleaved: Some((rtp_channel, rtcp_channel)),
            ..Self::default()
        }
    }

    /// Parse the header value. Only the first transport of a
    /// comma-separated list is read.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp_source::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(th.client_port, Some((8000, 8001)));
    ///
    /// let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert!(th.tcp);
    /// assert_eq!(th.interleaved, Some((2, 3)));
    ///
    /// assert!(TransportHeader::parse("RAW/RAW/UDP;unicast").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let first = header.split(',').next()?;
        let mut parts = first.split(';').map(str::trim);

        let profile = parts.next()?.to_ascii_uppercase();
        if !profile.starts_with("RTP/") {
            return None;
        }
        let mut th = TransportHeader {
            tcp: profile.ends_with("/TCP"),
            ..Self::default()
        };

        for part in parts {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key.to_ascii_lowercase().as_str() {
                "client_port" => th.client_port = parse_pair(value),
                "server_port" => th.server_port = parse_pair(value),
                "interleaved" => th.interleaved = parse_pair(value),
                "ssrc" => th.ssrc = u32::from_str_radix(value.trim(), 16).ok(),
                "source" => th.source = Some(value.trim().to_string()),
                _ => {}
            }
        }
        Some(th)
    }

    pub fn serialize(&self) -> String {
        let mut value = String::from(if self.tcp {
            "RTP/AVP/TCP;unicast"
        } else {
            "RTP/AVP;unicast"
        });
        if let Some((rtp, rtcp)) = self.client_port {
            value.push_str(&format!(";client_port={rtp}-{rtcp}"));
        }
        if let Some((rtp, rtcp)) = self.server_port {
            value.push_str(&format!(";server_port={rtp}-{rtcp}"));
        }
        if let Some((rtp, rtcp)) = self.interleaved {
            value.push_str(&format!(";interleaved={rtp}-{rtcp}"));
        }
        if let Some(ssrc) = self.ssrc {
            value.push_str(&format!(";ssrc={ssrc:08X}"));
        }
        value
    }
}

/// `a-b` pair; a lone `a` means `a-(a+1)`.
fn parse_pair<T>(value: &str) -> Option<(T, T)>
where
    T: std::str::FromStr + Copy + TryFrom<u32> + Into<u32>,
{
    match value.trim().split_once('-') {
        Some((a, b)) => Some((a.trim().parse().ok()?, b.trim().parse().ok()?)),
        None => {
            let a: T = value.trim().parse().ok()?;
            let b = T::try_from(a.into() + 1).ok()?;
            Some((a, b))
        }
    }
}

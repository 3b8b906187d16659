/// RTP fixed header, read from a received packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            CSRC list (CC entries), extension (if X)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Packets are relayed verbatim; this view exists for consumers and logs
/// that want to peek at sequence numbers or timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    header_len: usize,
    padding_len: usize,
}

const FIXED_HEADER_LEN: usize = 12;
const RTP_VERSION: u8 = 2;

impl RtpHeader {
    /// Parse the header of an RTP packet; `None` if it is not RTP v2 or is
    /// truncated.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < FIXED_HEADER_LEN || packet[0] >> 6 != RTP_VERSION {
            return None;
        }
        let padding = packet[0] & 0x20 != 0;
        let extension = packet[0] & 0x10 != 0;
        let csrc_count = (packet[0] & 0x0f) as usize;

        let mut header_len = FIXED_HEADER_LEN + csrc_count * 4;
        if extension {
            let ext = packet.get(header_len..header_len + 4)?;
            let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
            header_len += 4 + words * 4;
        }
        if header_len > packet.len() {
            return None;
        }

        let padding_len = if padding {
            let n = *packet.last()? as usize;
            if n == 0 || header_len + n > packet.len() {
                return None;
            }
            n
        } else {
            0
        };

        Some(Self {
            marker: packet[1] & 0x80 != 0,
            payload_type: packet[1] & 0x7f,
            sequence_number: u16::from_be_bytes([packet[2], packet[3]]),
            timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
            header_len,
            padding_len,
        })
    }

    /// Payload bytes of `packet`, excluding header, extension and padding.
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        &packet[self.header_len..packet.len() - self.padding_len]
    }
}

/// RTCP packet type for a receiver report (RFC 3550 §6.4.2).
pub const RTCP_RECEIVER_REPORT: u8 = 201;

/// Empty receiver report: header plus reporter SSRC, no report blocks.
///
/// Sent periodically so that servers which time sessions out on RTCP
/// silence keep the session alive.
pub fn receiver_report(ssrc: u32) -> [u8; 8] {
    let mut packet = [0u8; 8];
    packet[0] = RTP_VERSION << 6;
    packet[1] = RTCP_RECEIVER_REPORT;
    // Length in 32-bit words minus one.
    packet[2..4].copy_from_slice(&1u16.to_be_bytes());
    packet[4..8].copy_from_slice(&ssrc.to_be_bytes());
    packet
}

//! Network transport for RTSP signaling and RTP media reception.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): the control connection carrying requests and
//!   responses, optionally wrapped in TLS ([`tls`]) for `rtsps`. In
//!   TCP-interleaved mode it also carries RTP/RTCP in `$` frames
//!   (RFC 2326 §10.12).
//!
//! - **UDP** ([`udp`]): one even/odd socket pair per medium receiving RTP
//!   and RTCP directly from the server.
//!
//! [`negotiate`] picks the lower transport for a connection attempt.

pub mod tcp;
pub mod tls;
pub mod udp;

pub use tcp::RtspConnection;
pub use udp::UdpPair;

use crate::config::TransportPreference;
use crate::session::TransportMode;

/// Lower transport for the next attempt.
///
/// TLS always uses TCP. `Auto` starts with UDP until a previous attempt
/// proved it unusable.
pub fn negotiate(preference: TransportPreference, tls: bool, force_tcp: bool) -> TransportMode {
    match preference {
        _ if tls => TransportMode::Tcp,
        TransportPreference::Tcp => TransportMode::Tcp,
        TransportPreference::Udp => TransportMode::Udp,
        TransportPreference::Auto if force_tcp => TransportMode::Tcp,
        TransportPreference::Auto => TransportMode::Udp,
    }
}

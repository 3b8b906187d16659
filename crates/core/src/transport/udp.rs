use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use rand::Rng;

use crate::cancel::POLL_INTERVAL;
use crate::error::{Result, SourceError, is_timeout};
use crate::relay::{Packet, PacketKind, Relay};

/// Local RTP ports are drawn from this range; RTP even, RTCP = RTP + 1
/// (RFC 3550 §11).
const CLIENT_PORT_MIN: u16 = 10000;
const CLIENT_PORT_MAX: u16 = 65534;
const BIND_ATTEMPTS: usize = 64;

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65535;

/// An RTP/RTCP receive socket pair for one medium.
#[derive(Debug, Clone)]
pub struct UdpPair {
    pub rtp: Arc<UdpSocket>,
    pub rtcp: Arc<UdpSocket>,
    pub rtp_port: u16,
    pub rtcp_port: u16,
}

impl UdpPair {
    /// Bind an even/odd port pair on the wildcard address of `peer`'s family.
    pub fn bind(peer: IpAddr) -> Result<Self> {
        let local: IpAddr = match peer {
            IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let mut rng = rand::rng();

        for _ in 0..BIND_ATTEMPTS {
            let rtp_port = rng.random_range(CLIENT_PORT_MIN / 2..=CLIENT_PORT_MAX / 2) * 2;
            let Ok(rtp) = UdpSocket::bind(SocketAddr::new(local, rtp_port)) else {
                continue;
            };
            let Ok(rtcp) = UdpSocket::bind(SocketAddr::new(local, rtp_port + 1)) else {
                continue;
            };
            rtp.set_read_timeout(Some(POLL_INTERVAL))?;
            rtcp.set_read_timeout(Some(POLL_INTERVAL))?;

            tracing::debug!(rtp_port, rtcp_port = rtp_port + 1, "bound UDP port pair");
            return Ok(Self {
                rtp: Arc::new(rtp),
                rtcp: Arc::new(rtcp),
                rtp_port,
                rtcp_port: rtp_port + 1,
            });
        }

        Err(SourceError::ConnectionLost(
            "no free UDP port pair for RTP/RTCP".to_string(),
        ))
    }
}

/// Read datagrams from `socket` into the relay until `active` clears.
///
/// Datagrams from any address other than `server` are dropped.
pub fn spawn_reader(
    socket: Arc<UdpSocket>,
    media: usize,
    kind: PacketKind,
    server: IpAddr,
    relay: Relay,
    active: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        while active.load(Ordering::SeqCst) {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if from.ip() != server {
                        tracing::trace!(%from, "dropping datagram from unexpected source");
                        continue;
                    }
                    relay.push(Packet::new(media, kind, buf[..n].to_vec()));
                }
                Err(e) if is_timeout(&e) => {}
                Err(e) => {
                    tracing::warn!(error = %e, media, ?kind, "UDP receive failed");
                    break;
                }
            }
        }
    })
}

/// Send one datagram; RTCP reports go through here.
pub fn send_to(socket: &UdpSocket, payload: &[u8], addr: SocketAddr) -> Result<()> {
    socket
        .send_to(payload, addr)
        .map(|_| ())
        .map_err(SourceError::from_write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::parent::Parent;
    use crate::relay::{self, RelayCounters};
    use crossbeam::channel::{self, Sender};
    use std::time::Duration;

    struct Forward(Sender<Packet>);

    impl Parent for Forward {
        fn on_packet(&self, packet: Packet) {
            let _ = self.0.send(packet);
        }
    }

    #[test]
    fn binds_even_odd_pair() {
        let pair = UdpPair::bind(Ipv4Addr::LOCALHOST.into()).unwrap();
        assert_eq!(pair.rtp_port % 2, 0);
        assert_eq!(pair.rtcp_port, pair.rtp_port + 1);
        assert!(pair.rtp_port >= CLIENT_PORT_MIN);
    }

    #[test]
    fn reader_filters_by_source() {
        let pair = UdpPair::bind(Ipv4Addr::LOCALHOST.into()).unwrap();
        let (tx, rx) = channel::unbounded();
        let (relay, delivery) = relay::spawn(
            16,
            Arc::new(Forward(tx)),
            Arc::new(RelayCounters::default()),
            CancelToken::new(),
        );
        let active = Arc::new(AtomicBool::new(true));
        // Only accept datagrams that claim to come from a different host.
        let reader = spawn_reader(
            pair.rtp.clone(),
            0,
            PacketKind::Rtp,
            "192.0.2.1".parse().unwrap(),
            relay.clone(),
            active.clone(),
        );

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&[0x80, 96, 0, 1], ("127.0.0.1", pair.rtp_port))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        active.store(false, Ordering::SeqCst);
        reader.join().unwrap();

        // Now accept localhost.
        active.store(true, Ordering::SeqCst);
        let reader = spawn_reader(
            pair.rtp.clone(),
            0,
            PacketKind::Rtp,
            Ipv4Addr::LOCALHOST.into(),
            relay.clone(),
            active.clone(),
        );
        sender
            .send_to(&[0x80, 96, 0, 2], ("127.0.0.1", pair.rtp_port))
            .unwrap();
        let packet = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(packet.payload, vec![0x80, 96, 0, 2]);
        assert_eq!(packet.kind, PacketKind::Rtp);

        active.store(false, Ordering::SeqCst);
        reader.join().unwrap();
        drop(relay);
        delivery.join();
    }
}

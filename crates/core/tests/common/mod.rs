//! In-process mock RTSP server and a recording parent for integration
//! tests.
//!
//! The server answers DESCRIBE / SETUP / PLAY through a [`Handler`], checks
//! credentials when configured, and after PLAY sends one known RTP packet
//! every [`MEDIA_PERIOD`] on each set-up transport.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use base64::Engine;
use crossbeam::channel::{self, Receiver, Sender};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};

use rtsp_source::auth::parse_params;
use rtsp_source::protocol::{Message, MessageDecoder, RtspRequest, RtspResponse};
use rtsp_source::session::TransportHeader;
use rtsp_source::transport::tls::fingerprint;
use rtsp_source::{ErrorKind, Packet, Parent, State};

pub const RTP_SEQUENCE: u16 = 57899;
pub const RTP_TIMESTAMP: u32 = 345234345;
pub const RTP_SSRC: u32 = 978651231;
pub const RTP_PAYLOAD_TYPE: u8 = 96;
pub const RTP_PAYLOAD: [u8; 5] = [5, 1, 2, 3, 4];

pub const REALM: &str = "IPCAM";
pub const NONCE: &str = "dcd98b7102dd2f0e8b11d0f600bfb0c0";
pub const SESSION_ID: &str = "12345678";

const MEDIA_PERIOD: Duration = Duration::from_millis(100);
const POLL: Duration = Duration::from_millis(20);

const SDP: &str = "v=0\r\n\
    o=- 0 0 IN IP4 127.0.0.1\r\n\
    s=Stream\r\n\
    c=IN IP4 0.0.0.0\r\n\
    t=0 0\r\n\
    a=control:*\r\n\
    m=video 0 RTP/AVP 96\r\n\
    a=rtpmap:96 H264/90000\r\n\
    a=fmtp:96 packetization-mode=1\r\n\
    a=control:trackID=0\r\n";

/// Sequence number of the packet sent ahead of the PLAY response.
pub const EARLY_RTP_SEQUENCE: u16 = RTP_SEQUENCE - 1;

/// The RTP packet the server streams: marker set, PT 96.
pub fn rtp_packet() -> Vec<u8> {
    rtp_packet_with_sequence(RTP_SEQUENCE)
}

pub fn rtp_packet_with_sequence(sequence: u16) -> Vec<u8> {
    let mut packet = vec![0x80, 0x80 | RTP_PAYLOAD_TYPE];
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(&RTP_TIMESTAMP.to_be_bytes());
    packet.extend_from_slice(&RTP_SSRC.to_be_bytes());
    packet.extend_from_slice(&RTP_PAYLOAD);
    packet
}

/// Server-side behavior of the three handshake steps.
pub trait Handler: Send + Sync + 'static {
    fn on_describe(&self, request: &RtspRequest) -> RtspResponse {
        RtspResponse::ok()
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", &format!("{}/", request.uri))
            .with_body(SDP.to_string())
    }

    fn on_setup(&self, request: &RtspRequest, server_ports: (u16, u16)) -> RtspResponse {
        let Some(transport) = request.get_header("Transport").and_then(TransportHeader::parse)
        else {
            return RtspResponse::new(400, "Bad Request");
        };
        let reply = match (transport.interleaved, transport.client_port) {
            (Some((rtp, rtcp)), _) => format!("RTP/AVP/TCP;unicast;interleaved={rtp}-{rtcp}"),
            (None, Some((rtp, rtcp))) => format!(
                "RTP/AVP;unicast;client_port={rtp}-{rtcp};server_port={}-{};ssrc={RTP_SSRC:08X}",
                server_ports.0, server_ports.1
            ),
            (None, None) => return RtspResponse::new(461, "Unsupported Transport"),
        };
        RtspResponse::ok()
            .add_header("Transport", &reply)
            .add_header("Session", &format!("{SESSION_ID};timeout=60"))
    }

    fn on_play(&self, request: &RtspRequest) -> RtspResponse {
        let response = RtspResponse::ok();
        match request.get_header("Range") {
            Some(range) => response.add_header("Range", range),
            None => response,
        }
    }
}

/// A server that accepts whatever a well-behaved client asks for.
pub struct Compliant;

impl Handler for Compliant {}

/// Rejects UDP with 461 and accepts TCP-interleaved.
pub struct TcpOnly;

impl Handler for TcpOnly {
    fn on_setup(&self, request: &RtspRequest, server_ports: (u16, u16)) -> RtspResponse {
        match request.get_header("Transport") {
            Some(t) if t.contains("/TCP") => Compliant.on_setup(request, server_ports),
            _ => RtspResponse::new(461, "Unsupported Transport"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServerAuth {
    Basic { username: String, password: String },
    Digest { username: String, password: String },
    /// Challenge every request, whatever the credentials.
    RejectAll,
}

impl ServerAuth {
    pub fn basic(username: &str, password: &str) -> Self {
        Self::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn digest(username: &str, password: &str) -> Self {
        Self::Digest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn challenge(&self) -> String {
        match self {
            Self::Basic { .. } => format!("Basic realm=\"{REALM}\""),
            Self::Digest { .. } | Self::RejectAll => {
                format!("Digest realm=\"{REALM}\", nonce=\"{NONCE}\"")
            }
        }
    }

    fn accepts(&self, request: &RtspRequest) -> bool {
        let Some(header) = request.get_header("Authorization") else {
            return false;
        };
        match self {
            Self::Basic { username, password } => {
                let expected = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                header == format!("Basic {expected}")
            }
            Self::Digest { username, password } => {
                let Some(params) = header.strip_prefix("Digest ") else {
                    return false;
                };
                let params = parse_params(params);
                let get = |key: &str| {
                    params
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.as_str())
                        .unwrap_or("")
                };
                let ha1 = md5_hex(&format!("{username}:{REALM}:{password}"));
                let ha2 = md5_hex(&format!("{}:{}", request.method, request.uri));
                let expected = md5_hex(&format!("{ha1}:{NONCE}:{ha2}"));
                get("username") == username
                    && get("realm") == REALM
                    && get("nonce") == NONCE
                    && get("uri") == request.uri
                    && get("response") == expected
            }
            Self::RejectAll => false,
        }
    }
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Self-signed certificate for `127.0.0.1` and its SHA-256 fingerprint.
pub fn tls_config() -> (Arc<ServerConfig>, String) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
            .unwrap();
    let der: CertificateDer<'static> = cert.der().clone();
    let pin = fingerprint(der.as_ref());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![der], key)
    .unwrap();
    (Arc::new(config), pin)
}

pub struct ServerOptions {
    pub handler: Arc<dyn Handler>,
    pub auth: Option<ServerAuth>,
    pub tls: Option<Arc<ServerConfig>>,
    /// Accept UDP SETUP but never send datagrams.
    pub silent_udp: bool,
    /// Stop streaming after this many packets per PLAY, keeping the
    /// control connection open.
    pub stall_after_play: Option<usize>,
    /// Write one interleaved packet ([`EARLY_RTP_SEQUENCE`]) before the
    /// PLAY response.
    pub media_before_play: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            handler: Arc::new(Compliant),
            auth: None,
            tls: None,
            silent_udp: false,
            stall_after_play: None,
            media_before_play: false,
        }
    }
}

struct Context {
    handler: Arc<dyn Handler>,
    auth: Option<ServerAuth>,
    silent_udp: bool,
    stall_after_play: Option<usize>,
    media_before_play: bool,
    udp: UdpSocket,
    /// Bound only so receiver reports have somewhere to go.
    _rtcp: UdpSocket,
    udp_ports: (u16, u16),
    log: Mutex<Vec<RtspRequest>>,
    stop: AtomicBool,
}

pub struct MockServer {
    addr: SocketAddr,
    tls: bool,
    context: Arc<Context>,
    accept: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
        let rtcp = UdpSocket::bind("127.0.0.1:0").unwrap();
        let udp_ports = (
            udp.local_addr().unwrap().port(),
            rtcp.local_addr().unwrap().port(),
        );

        let context = Arc::new(Context {
            handler: options.handler,
            auth: options.auth,
            silent_udp: options.silent_udp,
            stall_after_play: options.stall_after_play,
            media_before_play: options.media_before_play,
            udp,
            _rtcp: rtcp,
            udp_ports,
            log: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });

        let tls = options.tls;
        let is_tls = tls.is_some();
        let accept_context = context.clone();
        let accept = thread::spawn(move || {
            while !accept_context.stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        stream.set_nonblocking(false).unwrap();
                        stream.set_read_timeout(Some(POLL)).unwrap();
                        let context = accept_context.clone();
                        let tls = tls.clone();
                        thread::spawn(move || match tls {
                            Some(config) => {
                                let Ok(conn) = ServerConnection::new(config) else {
                                    return;
                                };
                                serve(StreamOwned::new(conn, stream), peer.ip(), &context);
                            }
                            None => serve(stream, peer.ip(), &context),
                        });
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL),
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            tls: is_tls,
            context,
            accept: Some(accept),
        }
    }

    /// Source URL with optional `userinfo` (e.g. `"user:pass@"`).
    pub fn url(&self, userinfo: &str) -> String {
        let scheme = if self.tls { "rtsps" } else { "rtsp" };
        format!("{scheme}://{userinfo}{}/stream", self.addr)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RtspRequest> {
        self.context.log.lock().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.context
            .log
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.context.stop.store(true, Ordering::SeqCst);
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
    }
}

enum Target {
    Interleaved(u8),
    Udp(SocketAddr),
}

fn serve<S: Read + Write>(mut stream: S, peer: IpAddr, context: &Context) {
    let mut decoder = MessageDecoder::new();
    let mut buf = vec![0u8; 16 * 1024];
    let mut targets = Vec::new();
    let mut playing = false;
    let mut last_sent: Option<Instant> = None;
    let mut sent_since_play = 0;

    while !context.stop.load(Ordering::SeqCst) {
        loop {
            match decoder.decode() {
                Ok(Some(Message::Request(request))) => {
                    let response = respond(&request, peer, context, &mut targets, &mut playing);
                    if request.method == "PLAY" {
                        sent_since_play = 0;
                        if context.media_before_play
                            && playing
                            && send_frames(&mut stream, &targets, EARLY_RTP_SEQUENCE).is_err()
                        {
                            return;
                        }
                    }
                    if stream.write_all(response.serialize().as_bytes()).is_err() {
                        return;
                    }
                    let _ = stream.flush();
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => return,
            }
        }

        let stalled = context
            .stall_after_play
            .is_some_and(|limit| sent_since_play >= limit);
        if playing && !stalled && last_sent.is_none_or(|t| t.elapsed() >= MEDIA_PERIOD) {
            if send_media(&mut stream, &targets, context).is_err() {
                return;
            }
            sent_since_play += 1;
            last_sent = Some(Instant::now());
        }

        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => decoder.extend(&buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(_) => return,
        }
    }
}

fn respond(
    request: &RtspRequest,
    peer: IpAddr,
    context: &Context,
    targets: &mut Vec<Target>,
    playing: &mut bool,
) -> RtspResponse {
    context.log.lock().push(request.clone());

    let mut response = match &context.auth {
        Some(auth) if !auth.accepts(request) => RtspResponse::unauthorized(&auth.challenge()),
        _ => match request.method.as_str() {
            "DESCRIBE" => context.handler.on_describe(request),
            "SETUP" => {
                let response = context.handler.on_setup(request, context.udp_ports);
                if response.is_success()
                    && let Some(th) = response.get_header("Transport").and_then(TransportHeader::parse)
                {
                    match (th.interleaved, th.client_port) {
                        (Some((rtp, _)), _) => targets.push(Target::Interleaved(rtp)),
                        (None, Some((rtp, _))) => {
                            targets.push(Target::Udp(SocketAddr::new(peer, rtp)))
                        }
                        (None, None) => {}
                    }
                }
                response
            }
            "PLAY" => {
                let response = context.handler.on_play(request);
                *playing = response.is_success();
                response
            }
            "OPTIONS" => RtspResponse::ok()
                .add_header("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN"),
            "TEARDOWN" => {
                *playing = false;
                RtspResponse::ok()
            }
            _ => RtspResponse::new(405, "Method Not Allowed"),
        },
    };

    if let Some(cseq) = request.cseq() {
        response = response.add_header("CSeq", cseq);
    }
    response
}

fn interleaved_frame(channel: u8, packet: &[u8]) -> Vec<u8> {
    let mut frame = vec![b'$', channel];
    frame.extend_from_slice(&(packet.len() as u16).to_be_bytes());
    frame.extend_from_slice(packet);
    frame
}

/// One packet with `sequence` on every interleaved target.
fn send_frames<S: Write>(stream: &mut S, targets: &[Target], sequence: u16) -> io::Result<()> {
    let packet = rtp_packet_with_sequence(sequence);
    for target in targets {
        if let Target::Interleaved(channel) = target {
            stream.write_all(&interleaved_frame(*channel, &packet))?;
        }
    }
    stream.flush()
}

fn send_media<S: Write>(stream: &mut S, targets: &[Target], context: &Context) -> io::Result<()> {
    let packet = rtp_packet();
    for target in targets {
        match target {
            Target::Interleaved(channel) => {
                stream.write_all(&interleaved_frame(*channel, &packet))?;
                stream.flush()?;
            }
            Target::Udp(addr) if !context.silent_udp => {
                let _ = context.udp.send_to(&packet, addr);
            }
            Target::Udp(_) => {}
        }
    }
    Ok(())
}

/// Parent that records everything it is told.
pub struct Recorder {
    tx: Sender<Packet>,
    pub packets: Receiver<Packet>,
    pub states: Mutex<Vec<State>>,
    pub errors: Mutex<Vec<ErrorKind>>,
    pub ready: Mutex<usize>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        let (tx, packets) = channel::unbounded();
        Arc::new(Self {
            tx,
            packets,
            states: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            ready: Mutex::new(0),
        })
    }

    pub fn states(&self) -> Vec<State> {
        self.states.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.errors.lock().clone()
    }
}

impl Parent for Recorder {
    fn on_packet(&self, packet: Packet) {
        let _ = self.tx.send(packet);
    }

    fn on_ready(&self, _session: &rtsp_source::Session) {
        *self.ready.lock() += 1;
    }

    fn on_state(&self, state: State) {
        self.states.lock().push(state);
    }

    fn on_error(&self, error: &rtsp_source::SourceError) {
        self.errors.lock().push(error.kind());
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};

use crate::auth::Authenticator;
use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::config::SourceConfig;
use crate::error::{Result, SourceError, TimeoutKind, is_timeout};
use crate::handshake::Exchange;
use crate::protocol::request::USER_AGENT;
use crate::protocol::{Message, MessageDecoder, RtspRequest, RtspResponse};

use super::tls::{self, TlsStream};

const READ_CHUNK: usize = 64 * 1024;

/// Interleaved frames kept while waiting for a response; later ones are
/// dropped.
const EARLY_FRAME_LIMIT: usize = 256;

/// Control connection byte stream, plain or TLS.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

/// Client side of an RTSP control connection.
///
/// Stamps `CSeq` and `User-Agent` on every request and, once a session is
/// attached, `Session` and `Authorization` as well. Reads are bounded by
/// [`POLL_INTERVAL`] so callers can interleave cancellation checks.
pub struct RtspConnection {
    stream: Stream,
    decoder: MessageDecoder,
    read_buf: Vec<u8>,
    cseq: u32,
    peer: SocketAddr,
    response_timeout: Duration,
    cancel: CancelToken,
    session_id: Option<String>,
    auth: Option<Authenticator>,
    early_frames: Vec<(u8, Vec<u8>)>,
}

impl RtspConnection {
    /// Dial the configured server, with TLS for `rtsps` URLs.
    ///
    /// Name resolution and the TCP connect run on a short-lived dialer
    /// thread so cancellation is noticed within [`POLL_INTERVAL`]; an
    /// abandoned dialer exits on its own by the connect deadline.
    pub fn connect(config: &SourceConfig, cancel: &CancelToken) -> Result<Self> {
        let url = &config.url;
        let deadline = Instant::now() + config.read_timeout;

        let (tx, rx) = channel::bounded(1);
        let address = url.address();
        thread::Builder::new()
            .name("rtsp-dial".to_string())
            .spawn(move || {
                let _ = tx.send(dial(&address, deadline));
            })?;

        let tcp = loop {
            cancel.check()?;
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => break result?,
                Err(RecvTimeoutError::Timeout) if Instant::now() >= deadline => {
                    return Err(SourceError::Timeout(TimeoutKind::Connect));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::ConnectionLost("dialer exited".to_string()));
                }
            }
        };
        cancel.check()?;

        let peer = tcp.peer_addr()?;
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(Some(POLL_INTERVAL))?;
        tcp.set_write_timeout(Some(config.write_timeout))?;
        cancel.attach(&tcp);

        let stream = if url.is_tls() {
            let tls = tls::connect(
                tcp,
                url.server_name(),
                config.fingerprint.as_deref(),
                deadline,
                cancel,
            )?;
            Stream::Tls(Box::new(tls))
        } else {
            Stream::Plain(tcp)
        };

        tracing::info!(%peer, tls = url.is_tls(), "connected");

        Ok(Self {
            stream,
            decoder: MessageDecoder::new(),
            read_buf: vec![0; READ_CHUNK],
            cseq: 0,
            peer,
            response_timeout: config.read_timeout,
            cancel: cancel.clone(),
            session_id: None,
            auth: None,
            early_frames: Vec::new(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Attach session state for requests sent after the handshake.
    pub fn attach_session(&mut self, session_id: &str, auth: Option<Authenticator>) {
        self.session_id = Some(session_id.to_string());
        self.auth = auth;
    }

    /// Interleaved frames that arrived while waiting for a response, in
    /// arrival order.
    pub fn take_early_frames(&mut self) -> Vec<(u8, Vec<u8>)> {
        std::mem::take(&mut self.early_frames)
    }

    /// Send a request; returns the CSeq it was stamped with.
    pub fn send_request(&mut self, mut request: RtspRequest) -> Result<u32> {
        self.cseq += 1;
        request.set_header("CSeq", &self.cseq.to_string());
        request.set_header("User-Agent", USER_AGENT);
        if let Some(id) = &self.session_id
            && request.get_header("Session").is_none()
        {
            request = request.add_header("Session", id);
        }
        if request.get_header("Authorization").is_none()
            && let Some(auth) = self.auth.as_mut()
        {
            let value = auth.authorize(&request.method, &request.uri);
            request = request.add_header("Authorization", &value);
        }

        tracing::debug!(method = %request.method, uri = %request.uri, cseq = self.cseq, "request");
        self.write_all(request.serialize().as_bytes())?;
        Ok(self.cseq)
    }

    /// Answer a request the server sent on the control connection.
    pub fn answer(&mut self, request: &RtspRequest) -> Result<()> {
        tracing::debug!(method = %request.method, "answering server request");
        let mut response = RtspResponse::ok();
        if let Some(cseq) = request.cseq() {
            response = response.add_header("CSeq", cseq);
        }
        if let Some(id) = &self.session_id {
            response = response.add_header("Session", id);
        }
        self.write_all(response.serialize().as_bytes())
    }

    /// Send one interleaved frame (`$`, channel, length, payload).
    pub fn send_interleaved(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        let len = u16::try_from(payload.len())
            .map_err(|_| SourceError::ConnectionLost("interleaved frame too large".to_string()))?;
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.push(b'$');
        frame.push(channel);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        self.write_all(&frame)
    }

    /// Next decoded unit, or `Ok(None)` if nothing arrived within one poll.
    pub fn poll_message(&mut self) -> Result<Option<Message>> {
        if let Some(message) = self.decoder.decode()? {
            return Ok(Some(message));
        }

        match self.stream.read(&mut self.read_buf) {
            Ok(0) => Err(self.cancel.filter(SourceError::ConnectionLost(
                "connection closed by server".to_string(),
            ))),
            Ok(n) => {
                self.decoder.extend(&self.read_buf[..n]);
                self.decoder.decode()
            }
            Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(self.cancel.filter(e.into())),
        }
    }

    /// Wait for the response carrying `cseq`.
    ///
    /// Server requests are answered. Interleaved frames, typically media
    /// sent ahead of the PLAY response, are kept for
    /// [`take_early_frames`](Self::take_early_frames).
    pub fn read_response(&mut self, cseq: u32) -> Result<RtspResponse> {
        let deadline = Instant::now() + self.response_timeout;
        let expected = cseq.to_string();

        loop {
            self.cancel.check()?;
            match self.poll_message()? {
                Some(Message::Response(response)) => {
                    match response.cseq() {
                        Some(got) if got != expected => {
                            tracing::debug!(got, expected = %expected, "skipping stale response");
                        }
                        _ => {
                            tracing::debug!(
                                status = response.status_code,
                                reason = %response.status_text,
                                cseq,
                                "response"
                            );
                            return Ok(response);
                        }
                    }
                }
                Some(Message::Request(request)) => self.answer(&request)?,
                Some(Message::Data { channel, payload }) => {
                    if self.early_frames.len() < EARLY_FRAME_LIMIT {
                        self.early_frames.push((channel, payload));
                    } else {
                        tracing::debug!(channel, len = payload.len(), "dropping early interleaved frame");
                    }
                }
                None => {
                    if Instant::now() >= deadline {
                        return Err(SourceError::Timeout(TimeoutKind::Read));
                    }
                }
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .and_then(|_| self.stream.flush())
            .map_err(|e| self.cancel.filter(SourceError::from_write(e)))
    }
}

/// Resolve `address` and try each result until one connects.
fn dial(address: &str, deadline: Instant) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|e| SourceError::ConnectionLost(format!("cannot resolve {address}: {e}")))?
        .collect();

    let mut last_err = SourceError::ConnectionLost(format!("no address for {address}"));
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SourceError::Timeout(TimeoutKind::Connect));
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) if is_timeout(&e) => last_err = SourceError::Timeout(TimeoutKind::Connect),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect failed");
                last_err = SourceError::ConnectionLost(format!("{addr}: {e}"));
            }
        }
    }
    Err(last_err)
}

impl Exchange for RtspConnection {
    fn exchange(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        let cseq = self.send_request(request)?;
        self.read_response(cseq)
    }

    fn peer_ip(&self) -> IpAddr {
        self.peer.ip()
    }
}

#[cfg(test)]
impl RtspConnection {
    pub(crate) fn shutdown_write(&self) {
        if let Stream::Plain(stream) = &self.stream {
            let _ = stream.shutdown(std::net::Shutdown::Write);
        }
    }
}

impl Drop for RtspConnection {
    fn drop(&mut self) {
        self.cancel.detach();
    }
}

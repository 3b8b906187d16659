//! DESCRIBE → SETUP (per medium) → PLAY.
//!
//! The engine talks to the server through [`Exchange`], one request and
//! one response at a time, so it runs unchanged over a live
//! [`RtspConnection`](crate::transport::RtspConnection) or a scripted
//! exchange in tests.
//!
//! ## Authentication
//!
//! Any request answered with `401` is retried exactly once with an
//! `Authorization` header built from the challenge. A second `401` for the
//! same request fails with [`SourceError::AuthenticationFailed`]; there is
//! never a third attempt. Once accepted, the authenticator signs every
//! later request of the session.
//!
//! ```text
//! DESCRIBE            → 401 WWW-Authenticate: Digest realm="IPCAM" ...
//! DESCRIBE + Auth     → 200 (SDP)
//! SETUP trackID=0     → 200 Session: 1234;timeout=60
//! PLAY  Range: npt=0- → 200
//! ```

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::{AuthChallenge, Authenticator};
use crate::config::{SourceConfig, TransportPreference};
use crate::error::{Result, SourceError};
use crate::protocol::{Method, RtspRequest, RtspResponse, sdp};
use crate::session::{
    DEFAULT_SESSION_TIMEOUT_SECS, NegotiatedTransport, Session, SessionMedia, TransportHeader,
    TransportMode, parse_session_header,
};
use crate::transport::UdpPair;

const STATUS_UNAUTHORIZED: u16 = 401;
const STATUS_UNSUPPORTED_TRANSPORT: u16 = 461;

/// One request/response round trip with the server.
pub trait Exchange {
    /// Send `request` and wait for its response. `CSeq` is stamped by the
    /// implementation.
    fn exchange(&mut self, request: RtspRequest) -> Result<RtspResponse>;

    /// Address of the server, used to pick the UDP socket family.
    fn peer_ip(&self) -> IpAddr;
}

/// Outcome of a successful handshake.
#[derive(Debug)]
pub struct Negotiated {
    pub session: Session,
    /// UDP socket pairs, in medium order; empty for TCP.
    pub udp: Vec<UdpPair>,
    /// Accepted credentials, to sign keepalives and TEARDOWN.
    pub authenticator: Option<Authenticator>,
}

pub struct Handshake<'a> {
    config: &'a SourceConfig,
    mode: TransportMode,
    auth: Option<Authenticator>,
    session_id: Option<String>,
    session_timeout: Option<Duration>,
}

impl<'a> Handshake<'a> {
    pub fn new(config: &'a SourceConfig, mode: TransportMode) -> Self {
        Self {
            config,
            mode,
            auth: None,
            session_id: None,
            session_timeout: None,
        }
    }

    pub fn run<E: Exchange + ?Sized>(mut self, ex: &mut E) -> Result<Negotiated> {
        let request_uri = self.config.url.request_uri().to_string();

        let response = self.send(
            ex,
            Method::Describe,
            &request_uri,
            &[("Accept", "application/sdp".to_string())],
        )?;
        if !response.is_success() {
            return Err(unexpected(Method::Describe, &response));
        }

        let base_url = response
            .get_header("Content-Base")
            .or_else(|| response.get_header("Content-Location"))
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .unwrap_or(&request_uri)
            .to_string();
        let description = sdp::parse(response.body.as_deref().unwrap_or(""))?;
        info!(
            medias = description.medias.len(),
            base = %base_url,
            "stream described"
        );

        let mut medias = Vec::with_capacity(description.medias.len());
        let mut udp = Vec::new();
        for (index, media) in description.medias.into_iter().enumerate() {
            let control_url = sdp::control_url(&base_url, &media.control);
            let (transport, ssrc, pair) = self.setup(ex, index, &control_url)?;
            info!(
                index,
                kind = %media.kind,
                codecs = %media.codecs(),
                transport = ?transport,
                "medium set up"
            );
            udp.extend(pair);
            medias.push(SessionMedia {
                media,
                control_url,
                transport,
                ssrc,
            });
        }

        let play_url = sdp::control_url(&base_url, &description.control);
        let range = self.play(ex, &play_url)?;

        let session = Session {
            id: self.session_id.unwrap_or_default(),
            timeout: self
                .session_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS)),
            base_url,
            medias,
            range,
        };
        Ok(Negotiated {
            session,
            udp,
            authenticator: self.auth,
        })
    }

    fn setup<E: Exchange + ?Sized>(
        &mut self,
        ex: &mut E,
        index: usize,
        control_url: &str,
    ) -> Result<(NegotiatedTransport, Option<u32>, Option<UdpPair>)> {
        let (request, pair) = match self.mode {
            TransportMode::Udp => {
                let pair = UdpPair::bind(ex.peer_ip())?;
                (TransportHeader::udp(pair.rtp_port, pair.rtcp_port), Some(pair))
            }
            TransportMode::Tcp => {
                let rtp_channel = u8::try_from(index * 2).map_err(|_| SourceError::SetupRejected {
                    control: control_url.to_string(),
                    status: 0,
                    reason: "too many media for interleaved channels".to_string(),
                })?;
                (TransportHeader::interleaved(rtp_channel, rtp_channel + 1), None)
            }
        };

        let response = self.send(
            ex,
            Method::Setup,
            control_url,
            &[("Transport", request.serialize())],
        )?;

        if response.status_code == STATUS_UNSUPPORTED_TRANSPORT
            && self.mode == TransportMode::Udp
            && self.config.transport == TransportPreference::Auto
        {
            return Err(SourceError::TransportFallbackNeeded(format!(
                "server does not support UDP for {control_url}"
            )));
        }
        let rejected = |reason: &str| SourceError::SetupRejected {
            control: control_url.to_string(),
            status: response.status_code,
            reason: reason.to_string(),
        };
        if !response.is_success() {
            return Err(rejected(&response.status_text));
        }

        match response.get_header("Session") {
            Some(value) if self.session_id.is_none() => {
                let (id, timeout) = parse_session_header(value);
                debug!(session = %id, ?timeout, "session established");
                self.session_id = Some(id);
                self.session_timeout = timeout;
            }
            Some(_) => {}
            None if self.session_id.is_none() => {
                return Err(rejected("response has no Session header"));
            }
            None => {}
        }

        let reply = response.get_header("Transport").and_then(TransportHeader::parse);
        let ssrc = reply.as_ref().and_then(|th| th.ssrc);

        let transport = match (&request, reply) {
            (TransportHeader { tcp: false, .. }, Some(th)) if th.tcp || th.interleaved.is_some() => {
                return Err(rejected("server answered with TCP transport"));
            }
            (TransportHeader { tcp: true, .. }, Some(th)) if !th.tcp && th.client_port.is_some() => {
                return Err(rejected("server answered with UDP transport"));
            }
            (
                TransportHeader {
                    client_port: Some((rtp, rtcp)),
                    ..
                },
                reply,
            ) => {
                let server = reply.and_then(|th| th.server_port);
                NegotiatedTransport::Udp {
                    client_rtp_port: *rtp,
                    client_rtcp_port: *rtcp,
                    server_rtp_port: server.map(|(p, _)| p),
                    server_rtcp_port: server.map(|(_, p)| p),
                }
            }
            (requested, reply) => {
                let (rtp_channel, rtcp_channel) = reply
                    .and_then(|th| th.interleaved)
                    .or(requested.interleaved)
                    .unwrap_or((0, 1));
                NegotiatedTransport::Tcp {
                    rtp_channel,
                    rtcp_channel,
                }
            }
        };

        Ok((transport, ssrc, pair))
    }

    fn play<E: Exchange + ?Sized>(&mut self, ex: &mut E, url: &str) -> Result<Option<String>> {
        let requested = self.config.range_header();
        let headers: Vec<(&str, String)> = requested
            .iter()
            .map(|range| ("Range", range.clone()))
            .collect();

        let response = self.send(ex, Method::Play, url, &headers)?;
        if !response.is_success() {
            return Err(unexpected(Method::Play, &response));
        }
        Ok(response
            .get_header("Range")
            .map(str::to_string)
            .or(requested))
    }

    /// Send with the one-retry authentication rule.
    fn send<E: Exchange + ?Sized>(
        &mut self,
        ex: &mut E,
        method: Method,
        uri: &str,
        headers: &[(&str, String)],
    ) -> Result<RtspResponse> {
        let response = ex.exchange(self.request(method, uri, headers))?;
        if response.status_code != STATUS_UNAUTHORIZED {
            return Ok(response);
        }

        let credentials = self.config.url.credentials().cloned().ok_or_else(|| {
            SourceError::AuthenticationFailed(format!(
                "{method} requires credentials and none are configured"
            ))
        })?;
        let challenge = AuthChallenge::from_response(&response).ok_or_else(|| {
            SourceError::AuthenticationFailed(format!("{method} challenge uses no supported scheme"))
        })?;
        debug!(
            %method,
            scheme = challenge.scheme(),
            realm = challenge.realm(),
            "answering authentication challenge"
        );
        self.auth = Some(Authenticator::new(credentials, challenge));

        let response = ex.exchange(self.request(method, uri, headers))?;
        if response.status_code == STATUS_UNAUTHORIZED {
            return Err(SourceError::AuthenticationFailed(format!(
                "{method} rejected the configured credentials"
            )));
        }
        Ok(response)
    }

    fn request(&mut self, method: Method, uri: &str, headers: &[(&str, String)]) -> RtspRequest {
        let mut request = RtspRequest::new(method, uri);
        for (name, value) in headers {
            request = request.add_header(name, value);
        }
        if let Some(id) = &self.session_id {
            request = request.add_header("Session", id);
        }
        if let Some(auth) = self.auth.as_mut() {
            let value = auth.authorize(method.as_str(), uri);
            request = request.add_header("Authorization", &value);
        }
        request
    }
}

fn unexpected(method: Method, response: &RtspResponse) -> SourceError {
    SourceError::UnexpectedStatus {
        method: method.as_str(),
        status: response.status_code,
        reason: response.status_text.clone(),
    }
}

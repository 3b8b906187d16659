//! RTSP authentication (RFC 2617 / RFC 7616, as profiled by RFC 2326 §D).
//!
//! A server demands credentials by answering `401 Unauthorized` with one
//! or more `WWW-Authenticate` challenges. The client answers with an
//! `Authorization` header on the retried request and on every request
//! after it:
//!
//! ```text
//! S→C  WWW-Authenticate: Digest realm="IPCAM", nonce="a1b2", qop="auth"
//! C→S  Authorization: Digest username="admin", realm="IPCAM", nonce="a1b2",
//!        uri="rtsp://cam/live", response="…", qop=auth, nc=00000001, cnonce="…"
//! ```
//!
//! Digest is preferred over Basic when both are offered, and SHA-256 over
//! MD5 among digest challenges.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use md5::{Digest, Md5};
use rand::Rng;
use sha2::Sha256;

use crate::protocol::RtspResponse;
use crate::resolver::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Some(Self::Md5),
            "SHA-256" => Some(Self::Sha256),
            _ => None,
        }
    }

    fn hash(self, input: &str) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(input.as_bytes())),
            Self::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
        }
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Basic {
        realm: String,
    },
    Digest {
        realm: String,
        nonce: String,
        opaque: Option<String>,
        /// `None` when the server did not name one; MD5 is implied.
        algorithm: Option<DigestAlgorithm>,
        /// Server offered `qop=auth`.
        qop_auth: bool,
        stale: bool,
    },
}

impl AuthChallenge {
    /// Parse one header value. Unsupported schemes and digest algorithms
    /// yield `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        let params = parse_params(params);
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic {
                realm: param("realm").unwrap_or_default(),
            });
        }
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let algorithm = match param("algorithm") {
            Some(name) => Some(DigestAlgorithm::parse(&name)?),
            None => None,
        };
        let qop_auth = param("qop")
            .map(|qop| qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")))
            .unwrap_or(false);

        Some(Self::Digest {
            realm: param("realm")?,
            nonce: param("nonce")?,
            opaque: param("opaque"),
            algorithm,
            qop_auth,
            stale: param("stale").is_some_and(|s| s.eq_ignore_ascii_case("true")),
        })
    }

    /// Pick the strongest supported challenge of a 401 response.
    pub fn from_response(response: &RtspResponse) -> Option<Self> {
        response
            .get_headers("WWW-Authenticate")
            .filter_map(Self::parse)
            .max_by_key(Self::strength)
    }

    fn strength(&self) -> u8 {
        match self {
            Self::Basic { .. } => 0,
            Self::Digest {
                algorithm: Some(DigestAlgorithm::Sha256),
                ..
            } => 2,
            Self::Digest { .. } => 1,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "Basic",
            Self::Digest { .. } => "Digest",
        }
    }

    pub fn realm(&self) -> &str {
        match self {
            Self::Basic { realm } | Self::Digest { realm, .. } => realm,
        }
    }
}

/// Produces `Authorization` values for every request of a session once a
/// challenge has been accepted.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: Credentials,
    challenge: AuthChallenge,
    nonce_count: u32,
}

impl Authenticator {
    pub fn new(credentials: Credentials, challenge: AuthChallenge) -> Self {
        Self {
            credentials,
            challenge,
            nonce_count: 0,
        }
    }

    pub fn challenge(&self) -> &AuthChallenge {
        &self.challenge
    }

    /// `Authorization` header value for a request.
    pub fn authorize(&mut self, method: &str, uri: &str) -> String {
        let cnonce = format!("{:016x}", rand::rng().random::<u64>());
        self.authorize_with_cnonce(method, uri, &cnonce)
    }

    fn authorize_with_cnonce(&mut self, method: &str, uri: &str, cnonce: &str) -> String {
        let username = &self.credentials.username;
        let password = self.credentials.password();

        let AuthChallenge::Digest {
            realm,
            nonce,
            opaque,
            algorithm,
            qop_auth,
            ..
        } = &self.challenge
        else {
            let token = BASE64_STANDARD.encode(format!("{username}:{password}"));
            return format!("Basic {token}");
        };

        let hasher = algorithm.unwrap_or(DigestAlgorithm::Md5);
        let ha1 = hasher.hash(&format!("{username}:{realm}:{password}"));
        let ha2 = hasher.hash(&format!("{method}:{uri}"));

        let mut header = format!(
            "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\""
        );

        if *qop_auth {
            self.nonce_count += 1;
            let nc = format!("{:08x}", self.nonce_count);
            let response = hasher.hash(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));
            header.push_str(&format!(
                ", response=\"{response}\", qop=auth, nc={nc}, cnonce=\"{cnonce}\""
            ));
        } else {
            let response = hasher.hash(&format!("{ha1}:{nonce}:{ha2}"));
            header.push_str(&format!(", response=\"{response}\""));
        }

        if let Some(algorithm) = algorithm {
            let name = match algorithm {
                DigestAlgorithm::Md5 => "MD5",
                DigestAlgorithm::Sha256 => "SHA-256",
            };
            header.push_str(&format!(", algorithm={name}"));
        }
        if let Some(opaque) = opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        header
    }
}

/// Split `key="quoted, value", key=token` into lower-cased key/value pairs.
pub fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            key.push(c);
        }
        if key.is_empty() && chars.peek().is_none() {
            break;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.next_if_eq(&'"').is_some() {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => value.extend(chars.next()),
                        '"' => break,
                        _ => value.push(c),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| *c != ',') {
                    value.push(c);
                }
            }
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            params.push((key, value.trim().to_string()));
        }
    }
    params
}

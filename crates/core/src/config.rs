use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SourceError};
use crate::range::{RangeStart, RangeType};
use crate::resolver::SourceUrl;

/// Default maximum silence on the data path before reconnecting.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default maximum stall when writing control or keepalive data.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default capacity of the outgoing packet queue.
pub const DEFAULT_QUEUE_SIZE: usize = 512;
/// Default pause between reconnect attempts, used by
/// [`Parent::reconnect_delay`](crate::Parent::reconnect_delay).
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Length of a hex-encoded SHA-256 fingerprint.
const FINGERPRINT_HEX_LEN: usize = 64;

/// Which lower transport to request in SETUP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// Try UDP first, fall back to TCP-interleaved on reconnect.
    #[default]
    Auto,
    Udp,
    Tcp,
}

impl FromStr for TransportPreference {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(SourceError::InvalidConfig(format!(
                "unknown transport '{other}': expected udp, tcp or auto"
            ))),
        }
    }
}

impl fmt::Display for TransportPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Immutable configuration of one pull source.
///
/// Built with [`SourceConfig::builder`]; every field is validated at
/// build time so that a running source never meets a configuration error.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: SourceUrl,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub queue_size: usize,
    pub transport: TransportPreference,
    pub range_type: RangeType,
    pub range_start: Option<RangeStart>,
    /// Upper-case hex SHA-256 of the pinned leaf certificate.
    pub fingerprint: Option<String>,
    pub retry_pause: Duration,
}

impl SourceConfig {
    pub fn builder(url: &str) -> SourceConfigBuilder {
        SourceConfigBuilder {
            url: url.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_size: DEFAULT_QUEUE_SIZE,
            transport: TransportPreference::Auto,
            range_type: RangeType::None,
            range_start: String::new(),
            fingerprint: None,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    /// The `Range` header value to attach to PLAY, if any.
    pub fn range_header(&self) -> Option<String> {
        self.range_start.map(|s| s.header_value())
    }
}

/// Chained builder for [`SourceConfig`].
#[must_use]
#[derive(Debug, Clone)]
pub struct SourceConfigBuilder {
    url: String,
    read_timeout: Duration,
    write_timeout: Duration,
    queue_size: usize,
    transport: TransportPreference,
    range_type: RangeType,
    range_start: String,
    fingerprint: Option<String>,
    retry_pause: Duration,
}

impl SourceConfigBuilder {
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    pub fn transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }

    /// Range type plus its start string, parsed at [`build`](Self::build).
    pub fn range(mut self, kind: RangeType, start: &str) -> Self {
        self.range_type = kind;
        self.range_start = start.to_string();
        self
    }

    /// Pin the TLS peer by SHA-256 fingerprint. Colons, whitespace and
    /// case are ignored.
    pub fn fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }

    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn build(self) -> Result<SourceConfig> {
        let url = SourceUrl::parse(&self.url)?;

        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(SourceError::InvalidConfig(
                "read and write timeouts must be positive".to_string(),
            ));
        }
        if self.queue_size == 0 {
            return Err(SourceError::InvalidConfig(
                "outgoing queue size must be at least 1".to_string(),
            ));
        }
        if url.is_tls() && self.transport == TransportPreference::Udp {
            return Err(SourceError::InvalidConfig(
                "rtsps sources only support TCP transport".to_string(),
            ));
        }

        let range_start = RangeStart::parse(self.range_type, &self.range_start)?;
        let fingerprint = self
            .fingerprint
            .as_deref()
            .map(normalize_fingerprint)
            .transpose()?;

        Ok(SourceConfig {
            url,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            queue_size: self.queue_size,
            transport: self.transport,
            range_type: self.range_type,
            range_start,
            fingerprint,
            retry_pause: self.retry_pause,
        })
    }
}

fn normalize_fingerprint(raw: &str) -> Result<String> {
    let hex: String = raw
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if hex.len() != FINGERPRINT_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SourceError::InvalidConfig(format!(
            "fingerprint must be {FINGERPRINT_HEX_LEN} hex digits (SHA-256)"
        )));
    }
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIN: &str = "33949E05FFFB5FF3E8AA16F8213A6251B4D9363804BA53233C4DA9A46D6F2739";

    #[test]
    fn defaults() {
        let config = SourceConfig::builder("rtsp://cam/live").build().unwrap();
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.queue_size, DEFAULT_QUEUE_SIZE);
        assert_eq!(config.transport, TransportPreference::Auto);
        assert!(config.range_header().is_none());
        assert!(config.fingerprint.is_none());
    }

    #[test]
    fn range_is_parsed_at_build() {
        let config = SourceConfig::builder("rtsp://cam/live")
            .range(RangeType::Npt, "350ms")
            .build()
            .unwrap();
        assert_eq!(config.range_header().as_deref(), Some("npt=0.35-"));

        let err = SourceConfig::builder("rtsp://cam/live")
            .range(RangeType::Clock, "noon")
            .build()
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidConfig(_)));
    }

    #[test]
    fn fingerprint_is_normalized() {
        let colons = PIN
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap().to_lowercase())
            .collect::<Vec<_>>()
            .join(":");
        let config = SourceConfig::builder("rtsps://cam/live")
            .fingerprint(&colons)
            .build()
            .unwrap();
        assert_eq!(config.fingerprint.as_deref(), Some(PIN));

        assert!(
            SourceConfig::builder("rtsps://cam/live")
                .fingerprint("abcd")
                .build()
                .is_err()
        );
    }

    #[test]
    fn rejects_zero_queue() {
        assert!(
            SourceConfig::builder("rtsp://cam/live")
                .queue_size(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn rejects_udp_over_tls() {
        assert!(
            SourceConfig::builder("rtsps://cam/live")
                .transport(TransportPreference::Udp)
                .build()
                .is_err()
        );
    }

    #[test]
    fn invalid_url_surfaces() {
        let err = SourceConfig::builder("ftp://cam/live").build().unwrap_err();
        assert!(matches!(err, SourceError::InvalidSourceUrl(_)));
    }

    #[test]
    fn transport_from_str() {
        assert_eq!(
            "TCP".parse::<TransportPreference>().unwrap(),
            TransportPreference::Tcp
        );
        assert_eq!(
            "".parse::<TransportPreference>().unwrap(),
            TransportPreference::Auto
        );
        assert!("sctp".parse::<TransportPreference>().is_err());
    }
}

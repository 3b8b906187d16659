//! PLAY `Range` header construction (RFC 2326 §12.29).
//!
//! Three start-position encodings are supported, all sent as open-ended
//! ranges:
//!
//! | Type | Start input | Header value |
//! |------|-------------|--------------|
//! | `clock` | `20230812T120000Z` | `clock=20230812T120000Z-` |
//! | `npt` | `350ms` | `npt=0.35-` |
//! | `smpte` | `130s` | `smpte=0:02:10-` |
//!
//! Start values for `npt` and `smpte` are durations written the way the
//! rest of the configuration writes them (see [`parse_duration`]).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{Result, SourceError};

const CLOCK_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Which range encoding to send with PLAY.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangeType {
    /// No `Range` header is sent.
    #[default]
    None,
    /// Absolute UTC wall-clock time.
    Clock,
    /// Normal play time, seconds from the stream start.
    Npt,
    /// SMPTE timecode relative to the stream start.
    Smpte,
}

impl FromStr for RangeType {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "clock" => Ok(Self::Clock),
            "npt" => Ok(Self::Npt),
            "smpte" => Ok(Self::Smpte),
            other => Err(SourceError::InvalidConfig(format!(
                "unknown range type '{other}': expected none, clock, npt or smpte"
            ))),
        }
    }
}

impl fmt::Display for RangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Clock => write!(f, "clock"),
            Self::Npt => write!(f, "npt"),
            Self::Smpte => write!(f, "smpte"),
        }
    }
}

/// A parsed range start, typed by its encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStart {
    Clock(DateTime<Utc>),
    Npt(Duration),
    Smpte(Duration),
}

impl RangeStart {
    /// Parse the configured start string for the given type.
    ///
    /// Returns `Ok(None)` for [`RangeType::None`].
    pub fn parse(kind: RangeType, start: &str) -> Result<Option<Self>> {
        let start = start.trim();
        let parsed = match kind {
            RangeType::None => return Ok(None),
            RangeType::Clock => Self::Clock(parse_clock(start)?),
            RangeType::Npt => Self::Npt(parse_duration(start)?),
            RangeType::Smpte => Self::Smpte(parse_duration(start)?),
        };
        Ok(Some(parsed))
    }

    /// Render the exact `Range` header value.
    pub fn header_value(&self) -> String {
        match self {
            Self::Clock(at) => format!("clock={}-", at.format(CLOCK_FORMAT)),
            Self::Npt(offset) => format!("npt={}-", format_npt(*offset)),
            Self::Smpte(offset) => format!("smpte={}-", format_smpte(*offset)),
        }
    }
}

/// Build the `Range` header value for a range type and start string.
///
/// Pure; `Ok(None)` means no header is sent.
pub fn build_range(kind: RangeType, start: &str) -> Result<Option<String>> {
    Ok(RangeStart::parse(kind, start)?.map(|s| s.header_value()))
}

fn parse_clock(start: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(start, CLOCK_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(start)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            SourceError::InvalidConfig(format!(
                "invalid clock range start '{start}': expected YYYYMMDDTHHMMSSZ"
            ))
        })
}

/// Seconds with at most two decimals, trailing zeros trimmed.
fn format_npt(offset: Duration) -> String {
    let hundredths = (offset.as_nanos() + 5_000_000) / 10_000_000;
    let whole = hundredths / 100;
    let frac = hundredths % 100;
    if frac == 0 {
        return whole.to_string();
    }
    let s = format!("{whole}.{frac:02}");
    s.trim_end_matches('0').to_string()
}

/// `H:MM:SS`, no leading zero on hours.
fn format_smpte(offset: Duration) -> String {
    let total = offset.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Parse a duration such as `10s`, `350ms`, `1h2m3.5s` or `0`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Negative values are
/// rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || SourceError::InvalidConfig(format!("invalid duration '{input}'"));

    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_range() {
        assert_eq!(
            build_range(RangeType::Clock, "20230812T120000Z").unwrap(),
            Some("clock=20230812T120000Z-".to_string())
        );
    }

    #[test]
    fn clock_accepts_rfc3339() {
        assert_eq!(
            build_range(RangeType::Clock, "2023-08-12T14:00:00+02:00").unwrap(),
            Some("clock=20230812T120000Z-".to_string())
        );
    }

    #[test]
    fn npt_range() {
        assert_eq!(
            build_range(RangeType::Npt, "350ms").unwrap(),
            Some("npt=0.35-".to_string())
        );
        assert_eq!(
            build_range(RangeType::Npt, "130s").unwrap(),
            Some("npt=130-".to_string())
        );
        assert_eq!(
            build_range(RangeType::Npt, "1.5s").unwrap(),
            Some("npt=1.5-".to_string())
        );
        assert_eq!(
            build_range(RangeType::Npt, "1234ms").unwrap(),
            Some("npt=1.23-".to_string())
        );
    }

    #[test]
    fn smpte_range() {
        assert_eq!(
            build_range(RangeType::Smpte, "130s").unwrap(),
            Some("smpte=0:02:10-".to_string())
        );
        assert_eq!(
            build_range(RangeType::Smpte, "1h2m3s").unwrap(),
            Some("smpte=1:02:03-".to_string())
        );
        assert_eq!(
            build_range(RangeType::Smpte, "10h").unwrap(),
            Some("smpte=10:00:00-".to_string())
        );
    }

    #[test]
    fn none_sends_nothing() {
        assert_eq!(build_range(RangeType::None, "whatever").unwrap(), None);
    }

    #[test]
    fn invalid_starts() {
        assert!(build_range(RangeType::Clock, "yesterday").is_err());
        assert!(build_range(RangeType::Npt, "350").is_err());
        assert!(build_range(RangeType::Smpte, "-5s").is_err());
    }

    #[test]
    fn range_type_from_str() {
        assert_eq!("".parse::<RangeType>().unwrap(), RangeType::None);
        assert_eq!("NPT".parse::<RangeType>().unwrap(), RangeType::Npt);
        assert!("frames".parse::<RangeType>().is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("350ms").unwrap(), Duration::from_millis(350));
        assert_eq!(parse_duration("1h2m").unwrap(), Duration::from_secs(3720));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
    }
}

//! Message identity and wildcard matching
//!
//! A [`MessageId`] names either a concrete frame that was decoded off the
//! stream or a filter a caller wants frames to match. Wildcards:
//! - UBX: class `0xFF` and/or id `0xFF` match anything in that byte
//! - NMEA: `?` matches any single character; the wanted tag is a prefix
//! - RTCM: `0xFFFF` matches every message type

use crate::core::error::{GnssError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// UBX class wildcard
pub const UBX_CLASS_ALL: u8 = 0xFF;
/// UBX id wildcard
pub const UBX_ID_ALL: u8 = 0xFF;
/// RTCM message type wildcard
pub const RTCM_ID_ALL: u16 = 0xFFFF;
/// NMEA single-character wildcard
pub const NMEA_WILDCARD: u8 = b'?';
/// Longest NMEA talker+sentence tag that is stored
pub const NMEA_TAG_MAX: usize = 5;

/// A receiver protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// u-blox binary
    Ubx,
    /// NMEA 0183
    Nmea,
    /// RTCM 3
    Rtcm,
    /// Every protocol at once (configuration only)
    All,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ubx => write!(f, "UBX"),
            Protocol::Nmea => write!(f, "NMEA"),
            Protocol::Rtcm => write!(f, "RTCM"),
            Protocol::All => write!(f, "ALL"),
        }
    }
}

impl FromStr for Protocol {
    type Err = GnssError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ubx" => Ok(Self::Ubx),
            "nmea" => Ok(Self::Nmea),
            "rtcm" => Ok(Self::Rtcm),
            "all" => Ok(Self::All),
            other => Err(GnssError::InvalidParameter(format!(
                "unknown protocol '{other}'"
            ))),
        }
    }
}

/// Fixed-capacity NMEA sentence tag such as `GPGGA` or `G?GSV`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NmeaId {
    chars: [u8; NMEA_TAG_MAX],
    len: u8,
}

impl NmeaId {
    /// Build a tag; at most five printable ASCII characters.
    pub fn new(tag: &str) -> Result<Self> {
        if tag.len() > NMEA_TAG_MAX || !tag.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(GnssError::InvalidParameter(format!(
                "bad NMEA tag '{tag}'"
            )));
        }
        Ok(Self::from_bytes(tag.as_bytes()))
    }

    /// Callers guarantee ASCII of at most [`NMEA_TAG_MAX`] bytes.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(NMEA_TAG_MAX);
        let mut chars = [0u8; NMEA_TAG_MAX];
        chars[..len].copy_from_slice(&bytes[..len]);
        Self {
            chars,
            len: len as u8,
        }
    }

    /// The tag as text
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    fn as_bytes(&self) -> &[u8] {
        &self.chars[..self.len as usize]
    }

    /// Walk the wanted pattern; the actual tag must not run out first.
    pub fn matches(&self, wanted: &NmeaId) -> bool {
        let actual = self.as_bytes();
        wanted.as_bytes().iter().enumerate().all(|(i, &w)| {
            actual
                .get(i)
                .is_some_and(|&a| w == NMEA_WILDCARD || w == a)
        })
    }
}

impl fmt::Debug for NmeaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NmeaId({:?})", self.as_str())
    }
}

/// Identity of a decoded frame, or a filter on frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// UBX, class in the high byte and id in the low byte
    Ubx(u16),
    /// NMEA sentence tag
    Nmea(NmeaId),
    /// RTCM 3 message type
    Rtcm(u16),
    /// Bytes that did not form any frame
    Unknown,
    /// Filter: anything, including garbage
    Any,
    /// Filter: any recognised frame
    All,
}

impl MessageId {
    /// UBX identity from class and id
    pub fn ubx(class: u8, id: u8) -> Self {
        Self::Ubx(u16::from_be_bytes([class, id]))
    }

    /// NMEA identity from a tag
    pub fn nmea(tag: &str) -> Result<Self> {
        NmeaId::new(tag).map(Self::Nmea)
    }

    /// `(class, id)` for UBX identities
    pub fn ubx_class_id(&self) -> Option<(u8, u8)> {
        match self {
            Self::Ubx(v) => {
                let [class, id] = v.to_be_bytes();
                Some((class, id))
            }
            _ => None,
        }
    }

    /// Protocol of a concrete frame identity
    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            Self::Ubx(_) => Some(Protocol::Ubx),
            Self::Nmea(_) => Some(Protocol::Nmea),
            Self::Rtcm(_) => Some(Protocol::Rtcm),
            _ => None,
        }
    }

    /// Does this (actual) identity satisfy the `wanted` filter?
    pub fn is_wanted_by(&self, wanted: &MessageId) -> bool {
        match (wanted, self) {
            (MessageId::Any, _) => true,
            (MessageId::All, actual) => *actual != MessageId::Unknown,
            (MessageId::Unknown, actual) => *actual == MessageId::Unknown,
            (MessageId::Ubx(w), MessageId::Ubx(a)) => ubx_id_matches(*a, *w),
            (MessageId::Nmea(w), MessageId::Nmea(a)) => a.matches(w),
            (MessageId::Rtcm(w), MessageId::Rtcm(a)) => *w == RTCM_ID_ALL || w == a,
            _ => false,
        }
    }
}

/// UBX match with `0xFF` wildcards in either byte of `wanted`
pub fn ubx_id_matches(actual: u16, wanted: u16) -> bool {
    let mut actual = actual;
    if wanted & 0x00FF == u16::from(UBX_ID_ALL) {
        actual |= u16::from(UBX_ID_ALL);
    }
    if wanted & 0xFF00 == u16::from(UBX_CLASS_ALL) << 8 {
        actual |= u16::from(UBX_CLASS_ALL) << 8;
    }
    actual == wanted
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Ubx(v) => {
                let [class, id] = v.to_be_bytes();
                write!(f, "UBX-{class:02X}-{id:02X}")
            }
            MessageId::Nmea(tag) => write!(f, "NMEA-{}", tag.as_str()),
            MessageId::Rtcm(t) => write!(f, "RTCM-{t}"),
            MessageId::Unknown => write!(f, "UNKNOWN"),
            MessageId::Any => write!(f, "ANY"),
            MessageId::All => write!(f, "ALL"),
        }
    }
}

/// Parses the [`Display`](fmt::Display) form: `UBX-01-07`, `UBX-FF-FF`,
/// `NMEA-G?GSV`, `RTCM-1005`, `ANY`, `ALL`, `UNKNOWN`.
impl FromStr for MessageId {
    type Err = GnssError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || GnssError::InvalidParameter(format!("bad message id '{s}'"));
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "ANY" => return Ok(Self::Any),
            "ALL" => return Ok(Self::All),
            "UNKNOWN" => return Ok(Self::Unknown),
            _ => {}
        }
        let (kind, rest) = upper.split_once('-').ok_or_else(bad)?;
        match kind {
            "UBX" => {
                let (class, id) = rest.split_once('-').ok_or_else(bad)?;
                let class = u8::from_str_radix(class, 16).map_err(|_| bad())?;
                let id = u8::from_str_radix(id, 16).map_err(|_| bad())?;
                Ok(Self::ubx(class, id))
            }
            "NMEA" => Self::nmea(rest),
            "RTCM" if rest == "*" => Ok(Self::Rtcm(RTCM_ID_ALL)),
            "RTCM" => rest.parse().map(Self::Rtcm).map_err(|_| bad()),
            _ => Err(bad()),
        }
    }
}

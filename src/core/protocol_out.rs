//! Switching the receiver's protocol output on the host port
//!
//! Two strategies, chosen by module generation:
//! - CFG-PRT (M8): read-modify-write of the port's output bitmap, confirmed
//!   through MON-MSGPP because the receiver does not ACK it reliably
//! - CFG-VALSET / CFG-VALGET (M9 and later): one key per protocol in the
//!   port's output group, written to the RAM layer

use crate::core::capability::Feature;
use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::protocol::message_id::Protocol;
use crate::core::protocol::ubx::{self, CFG_PRT, CFG_VALGET, CFG_VALSET, CLASS_CFG};
use std::fmt;

/// Body length of CFG-PRT
pub const CFG_PRT_BODY_LEN: usize = 20;
/// Offset of the output protocol mask in CFG-PRT
pub const CFG_PRT_OUT_MASK_OFFSET: usize = 14;
/// Wait after a CFG-PRT write before checking it took
pub const CFG_PRT_SETTLE_MS: u64 = 100;
/// RAM configuration layer
pub const CFG_VAL_LAYER_RAM: u8 = 0x01;
/// Item of a key that matches every item in its group
pub const CFG_VAL_ITEM_ALL: u16 = 0xFFFF;

const SIZE_ONE_BIT: u32 = 0x10 << 24;

/// A set of output protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolSet(u8);

impl ProtocolSet {
    const ORDER: [Protocol; 3] = [Protocol::Ubx, Protocol::Nmea, Protocol::Rtcm];

    fn bit(protocol: Protocol) -> u8 {
        match protocol {
            Protocol::Ubx => 0x01,
            Protocol::Nmea => 0x02,
            Protocol::Rtcm => 0x04,
            Protocol::All => 0x07,
        }
    }

    /// The empty set
    pub fn empty() -> Self {
        Self(0)
    }

    /// Add a protocol (`All` adds every one)
    pub fn insert(&mut self, protocol: Protocol) {
        self.0 |= Self::bit(protocol);
    }

    /// Whether `protocol` is in the set (`All` needs every one)
    pub fn contains(&self, protocol: Protocol) -> bool {
        let bit = Self::bit(protocol);
        self.0 & bit == bit
    }

    /// Members in UBX, NMEA, RTCM order
    pub fn iter(&self) -> impl Iterator<Item = Protocol> + '_ {
        Self::ORDER.into_iter().filter(|p| self.contains(*p))
    }
}

impl FromIterator<Protocol> for ProtocolSet {
    fn from_iter<I: IntoIterator<Item = Protocol>>(iter: I) -> Self {
        let mut set = Self::empty();
        iter.into_iter().for_each(|p| set.insert(p));
        set
    }
}

impl fmt::Display for ProtocolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|p| p.to_string()).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// CFG-PRT output mask bit of a protocol
fn legacy_mask(protocol: Protocol) -> u16 {
    match protocol {
        Protocol::Ubx => 0x0001,
        Protocol::Nmea => 0x0002,
        Protocol::Rtcm => 0x0020,
        Protocol::All => 0xFFFF,
    }
}

/// Key group holding a port's output protocol switches
pub fn out_prot_group(port_number: u8) -> Result<u16> {
    match port_number {
        0 => Ok(0x72),
        1 => Ok(0x74),
        2 => Ok(0x76),
        3 => Ok(0x78),
        4 => Ok(0x7A),
        other => Err(GnssError::InvalidParameter(format!(
            "no output protocol keys for port {other}"
        ))),
    }
}

fn item_for(protocol: Protocol) -> Option<u16> {
    match protocol {
        Protocol::Ubx => Some(1),
        Protocol::Nmea => Some(2),
        Protocol::Rtcm => Some(4),
        Protocol::All => None,
    }
}

fn protocol_for_item(item: u16) -> Option<Protocol> {
    match item {
        1 => Some(Protocol::Ubx),
        2 => Some(Protocol::Nmea),
        4 => Some(Protocol::Rtcm),
        _ => None,
    }
}

/// One-bit configuration key of `item` in `group`
pub fn cfg_val_key(group: u16, item: u16) -> u32 {
    SIZE_ONE_BIT | (u32::from(group) << 16) | u32::from(item)
}

/// Bytes of value following a key, from its size tag
fn value_size(key: u32) -> usize {
    match (key >> 28) & 0x07 {
        1 | 2 => 1,
        3 => 2,
        4 => 4,
        5 => 8,
        _ => 0,
    }
}

/// Body of a CFG-VALSET switching `protocol` on or off in `group`.
pub fn valset_body(group: u16, protocol: Protocol, on: bool) -> Vec<u8> {
    let mut body = vec![0x00, CFG_VAL_LAYER_RAM, 0x00, 0x00];
    let single = [protocol];
    let protocols: &[Protocol] = match protocol {
        Protocol::All => &ProtocolSet::ORDER,
        _ => &single,
    };
    for p in protocols {
        if let Some(item) = item_for(*p) {
            body.extend_from_slice(&cfg_val_key(group, item).to_le_bytes());
            body.push(u8::from(on));
        }
    }
    body
}

/// Walk the key/value pairs of a CFG-VALGET reply body for `group`.
pub fn parse_valget(body: &[u8], group: u16) -> ProtocolSet {
    let mut set = ProtocolSet::empty();
    let mut pos = 4;
    while body.len().saturating_sub(pos) >= 5 {
        let Some(key) = ubx::le_u32(body, pos) else {
            break;
        };
        pos += 4;
        if key >> 16 == cfg_val_key(group, 0) >> 16 {
            if let Some(p) = protocol_for_item((key & 0xFFFF) as u16) {
                if body[pos] != 0 {
                    set.insert(p);
                }
            }
        }
        pos += value_size(key);
    }
    set
}

impl GnssDevice {
    /// Switch output of `protocol` on or off on the host port.
    ///
    /// Turning UBX off (alone or via `All`) would cut the driver off and is
    /// rejected, as is any use over the AT tunnel.
    pub fn set_protocol_out(&self, protocol: Protocol, on: bool) -> Result<()> {
        if !self.transport_type.is_streamed() {
            return Err(GnssError::InvalidParameter(
                "protocol output cannot be changed through the AT tunnel".to_string(),
            ));
        }
        if !on && matches!(protocol, Protocol::Ubx | Protocol::All) {
            return Err(GnssError::InvalidParameter(format!(
                "refusing to switch {protocol} output off"
            )));
        }
        tracing::info!("switching {} output {}", protocol, if on { "on" } else { "off" });
        if self.has_feature(Feature::CfgValXxx) {
            let group = out_prot_group(self.settings.port_number)?;
            self.send_ubx_with_ack(CLASS_CFG, CFG_VALSET, &valset_body(group, protocol, on))
        } else {
            self.set_protocol_out_cfg_prt(protocol, on)
        }
    }

    fn poll_cfg_prt(&self) -> Result<[u8; CFG_PRT_BODY_LEN]> {
        let mut prt = [0u8; CFG_PRT_BODY_LEN];
        let reply = self.send_receive_ubx(CLASS_CFG, CFG_PRT, &[self.settings.port_number], &mut prt)?;
        if reply.total_body_len != CFG_PRT_BODY_LEN {
            return Err(GnssError::Platform(format!(
                "CFG-PRT body of {} bytes",
                reply.total_body_len
            )));
        }
        Ok(prt)
    }

    fn set_protocol_out_cfg_prt(&self, protocol: Protocol, on: bool) -> Result<()> {
        let before = self.port_message_count()?;
        let mut prt = self.poll_cfg_prt()?;

        let mut mask = u16::from_le_bytes([
            prt[CFG_PRT_OUT_MASK_OFFSET],
            prt[CFG_PRT_OUT_MASK_OFFSET + 1],
        ]);
        let bits = legacy_mask(protocol);
        if on {
            mask |= bits;
        } else {
            mask &= !bits;
        }
        prt[CFG_PRT_OUT_MASK_OFFSET..CFG_PRT_OUT_MASK_OFFSET + 2].copy_from_slice(&mask.to_le_bytes());

        // No ACK is waited for: the port may be reconfigured under us
        self.send_ubx_no_wait(CLASS_CFG, CFG_PRT, &prt)?;
        self.clock.sleep_ms(CFG_PRT_SETTLE_MS);

        // MON-MSGPP, CFG-PRT poll, CFG-PRT write
        let after = self.port_message_count()?;
        let delta = after.wrapping_sub(before);
        if delta != 3 {
            return Err(GnssError::Platform(format!(
                "port message count rose by {delta}, expected 3"
            )));
        }
        Ok(())
    }

    /// Protocols currently output on the host port.
    pub fn get_protocol_out(&self) -> Result<ProtocolSet> {
        if !self.transport_type.is_streamed() {
            return Err(GnssError::NotSupported(
                "protocol output cannot be read through the AT tunnel".to_string(),
            ));
        }
        if self.has_feature(Feature::CfgValXxx) {
            let group = out_prot_group(self.settings.port_number)?;
            let mut query = vec![0u8; 4];
            query.extend_from_slice(&cfg_val_key(group, CFG_VAL_ITEM_ALL).to_le_bytes());
            let reply = self.send_receive_ubx_alloc(CLASS_CFG, CFG_VALGET, &query)?;
            if reply.body.len() <= 4 {
                return Err(GnssError::Platform("empty CFG-VALGET reply".to_string()));
            }
            Ok(parse_valget(&reply.body, group))
        } else {
            let prt = self.poll_cfg_prt()?;
            let mask = u16::from_le_bytes([
                prt[CFG_PRT_OUT_MASK_OFFSET],
                prt[CFG_PRT_OUT_MASK_OFFSET + 1],
            ]);
            Ok(ProtocolSet::ORDER
                .into_iter()
                .filter(|p| mask & legacy_mask(*p) != 0)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(cfg_val_key(0x74, 2), 0x1074_0002);
        assert_eq!(cfg_val_key(0x7A, CFG_VAL_ITEM_ALL), 0x107A_FFFF);
        assert_eq!(value_size(0x1074_0002), 1);
        assert_eq!(value_size(0x4000_0000), 4);
    }

    #[test]
    fn test_valset_body_single() {
        let body = valset_body(0x74, Protocol::Nmea, false);
        assert_eq!(body, vec![0, 1, 0, 0, 0x02, 0x00, 0x74, 0x10, 0x00]);
    }

    #[test]
    fn test_valset_body_all() {
        let body = valset_body(0x72, Protocol::All, true);
        assert_eq!(body.len(), 4 + 3 * 5);
        assert_eq!(&body[4..9], &[0x01, 0x00, 0x72, 0x10, 0x01]);
        assert_eq!(&body[14..19], &[0x04, 0x00, 0x72, 0x10, 0x01]);
    }

    #[test]
    fn test_parse_valget_walks_sizes() {
        let mut body = vec![0x01, 0x00, 0x00, 0x00];
        for (key, value) in [
            (cfg_val_key(0x74, 1), vec![1u8]),
            (0x3074_0010u32, vec![0xAA, 0xBB]),
            (cfg_val_key(0x74, 2), vec![0]),
            (cfg_val_key(0x76, 4), vec![1]),
            (cfg_val_key(0x74, 4), vec![1]),
        ] {
            body.extend_from_slice(&key.to_le_bytes());
            body.extend_from_slice(&value);
        }
        let set = parse_valget(&body, 0x74);
        assert!(set.contains(Protocol::Ubx));
        assert!(!set.contains(Protocol::Nmea));
        assert!(set.contains(Protocol::Rtcm));
        assert_eq!(set.to_string(), "UBX|RTCM");
    }

    #[test]
    fn test_protocol_set() {
        let mut set = ProtocolSet::empty();
        assert_eq!(set.to_string(), "none");
        set.insert(Protocol::All);
        assert!(set.contains(Protocol::All));
        assert_eq!(set.iter().count(), 3);
        assert_eq!(legacy_mask(Protocol::Rtcm), 0x20);
    }

    #[test]
    fn test_port_groups() {
        assert_eq!(out_prot_group(4).unwrap(), 0x7A);
        assert!(out_prot_group(5).is_err());
    }
}

//! Receiver protocol implementations
//!
//! Provides parsers, encoders, and helpers for the protocols a u-blox
//! receiver speaks on the same byte stream:
//! - UBX binary frames
//! - NMEA 0183 sentences
//! - RTCM 3 frames
//! - Checksum algorithms (Fletcher-8, XOR, CRC-24Q)
//! - Frame scanning and message identity matching

pub mod checksum;
pub mod framing;
pub mod message_id;
pub mod nmea;
pub mod rtcm;
pub mod ubx;

pub use framing::{scan, ParseCursor, ParseError, Scan};
pub use message_id::{ubx_id_matches, MessageId, NmeaId, Protocol};
pub use ubx::UbxFrame;

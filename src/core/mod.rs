//! Core module containing the driver functionality
//!
//! This module provides:
//! - Transport layer for the ways a receiver is attached (UART, I2C, SPI, AT)
//! - UBX, NMEA and RTCM framing with wildcard message identities
//! - Multi-cursor receive ring buffer
//! - Stream filling and time-bounded reads
//! - Frame decoding and the receive loop
//! - UBX request/response engine, direct and AT-tunnelled
//! - Protocol output configuration
//! - Module capability registry
//! - Device registry and background message receive

pub mod capability;
pub mod clock;
pub mod decoder;
pub mod device;
pub mod engine;
pub mod error;
pub mod msg_receive;
pub mod protocol;
pub mod protocol_out;
pub mod registry;
pub mod ring_buffer;
pub mod stream;
pub mod transport;

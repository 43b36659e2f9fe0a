//! # gnsslink Core Library
//!
//! Message framing and transport multiplexing for u-blox GNSS receivers:
//! - UART (host serial ports or any [`UartPort`] driver)
//! - I2C (length register polling)
//! - SPI (full duplex with idle-fill filtering)
//! - AT tunnel through an attached cellular module
//!
//! ## Features
//!
//! - UBX, NMEA and RTCM 3 frame parsing over one shared ring buffer
//! - Wildcard message filters
//! - UBX request/response with ACK/NACK handling
//! - Protocol output configuration (CFG-PRT and CFG-VALSET)
//! - Background message delivery to multiple readers
//! - CLI with exit codes
//!
//! ## Example
//!
//! ```rust,no_run
//! use gnsslink_core::{DeviceSettings, GnssDevice, ModuleType, SerialConfig, SerialUart, Transport};
//!
//! fn main() -> anyhow::Result<()> {
//!     let uart = SerialUart::open(&SerialConfig::new("/dev/ttyACM0", 38400))?;
//!     let device = GnssDevice::new(
//!         ModuleType::M9,
//!         Transport::Uart(Box::new(uart)),
//!         DeviceSettings::default(),
//!     )?;
//!
//!     // Poll UBX-MON-VER
//!     let reply = device.send_receive_ubx_alloc(0x0A, 0x04, &[])?;
//!     println!("MON-VER body: {} bytes", reply.body.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::ExitCodes;
pub use crate::config::{AppConfig, DeviceSettings};
pub use crate::core::capability::{Feature, ModuleType};
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::decoder::{decode_ring_buffer, OwnedMessage, Received};
pub use crate::core::device::GnssDevice;
pub use crate::core::engine::{UbxMessage, UbxReply};
pub use crate::core::error::{GnssError, Result};
pub use crate::core::msg_receive::{MessageCallback, MessageReceiver, ReaderId};
pub use crate::core::protocol::{MessageId, NmeaId, Protocol};
pub use crate::core::protocol_out::ProtocolSet;
pub use crate::core::registry::{DeviceHandle, DeviceRegistry};
pub use crate::core::ring_buffer::{CursorId, RingBuffer};
pub use crate::core::transport::{
    AtChannel, I2cBus, SerialConfig, SerialUart, SpiBus, Transport, TransportError, TransportType,
    UartPort,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

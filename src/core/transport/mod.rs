//! Transport layer for the four ways a GNSS receiver is attached
//!
//! Supports:
//! - UART (streamed, readable byte count)
//! - I2C (streamed, length register at 0xFD)
//! - SPI (streamed, full duplex with 0xFF fill)
//! - AT tunnel through an attached cellular module (not streamed)
//!
//! The driver primitives are traits so a board support layer, a host serial
//! port or a test double can sit underneath.

mod serial;

pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialParity, SerialUart};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default I2C address of a u-blox receiver
pub const DEFAULT_I2C_ADDRESS: u8 = 0x42;

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// UART / serial port
    Uart,
    /// I2C bus
    I2c,
    /// SPI bus
    Spi,
    /// AT command tunnel
    At,
}

impl TransportType {
    /// Streamed transports feed the ring buffer; AT does not.
    pub fn is_streamed(&self) -> bool {
        !matches!(self, Self::At)
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Uart => write!(f, "UART"),
            TransportType::I2c => write!(f, "I2C"),
            TransportType::Spi => write!(f, "SPI"),
            TransportType::At => write!(f, "AT"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Send error
    #[error("Send error: {0}")]
    SendError(String),

    /// Receive error
    #[error("Receive error: {0}")]
    ReceiveError(String),
}

/// A UART driver.
#[cfg_attr(test, mockall::automock)]
pub trait UartPort: Send {
    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever is available into `buf` without blocking for more.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Number of bytes waiting in the driver's receive buffer.
    fn pending_bytes(&mut self) -> Result<usize, TransportError>;
}

/// An I2C bus controller.
#[cfg_attr(test, mockall::automock)]
pub trait I2cBus: Send {
    /// Write `data` to `address`; `no_stop` leaves the bus claimed for a
    /// following read.
    fn send(&mut self, address: u8, data: &[u8], no_stop: bool) -> Result<(), TransportError>;

    /// Write `out` (may be empty) then read into `input`, returning the
    /// number of bytes read.
    fn send_receive(
        &mut self,
        address: u8,
        out: &[u8],
        input: &mut [u8],
    ) -> Result<usize, TransportError>;
}

/// A full-duplex SPI controller.
#[cfg_attr(test, mockall::automock)]
pub trait SpiBus: Send {
    /// Clock out `out` while clocking in `input.len()` bytes; when `out` is
    /// shorter than `input` the controller pads with 0xFF. Returns the
    /// number of bytes exchanged.
    fn send_receive_block(&mut self, out: &[u8], input: &mut [u8])
        -> Result<usize, TransportError>;
}

/// The AT client of an intermediate cellular module.
pub trait AtChannel: Send {
    /// Take exclusive use of the AT interface.
    fn lock(&mut self);

    /// Response timeout for the current exchange.
    fn set_timeout(&mut self, timeout_ms: u64);

    /// Begin a command line, e.g. `AT+UGUBX=`.
    fn command_start(&mut self, command: &str);

    /// Append a string parameter.
    fn write_string(&mut self, value: &str, quoted: bool);

    /// Terminate and send the command line.
    fn command_stop(&mut self);

    /// Wait for a response line starting with `prefix`.
    fn response_start(&mut self, prefix: &str);

    /// Read one string parameter of at most `max_len` characters.
    fn read_string(&mut self, max_len: usize) -> Result<String, TransportError>;

    /// Finish reading the response.
    fn response_stop(&mut self);

    /// Release the AT interface, reporting the outcome of the whole exchange.
    fn unlock(&mut self) -> Result<(), TransportError>;
}

/// A concrete transport bound to a device.
pub enum Transport {
    /// UART
    Uart(Box<dyn UartPort>),
    /// I2C with the receiver's address
    I2c {
        /// Bus driver
        bus: Box<dyn I2cBus>,
        /// 7-bit device address
        address: u8,
    },
    /// SPI
    Spi(Box<dyn SpiBus>),
    /// AT tunnel
    At(Box<dyn AtChannel>),
}

impl Transport {
    /// I2C transport at the default u-blox address.
    pub fn i2c(bus: Box<dyn I2cBus>) -> Self {
        Self::I2c {
            bus,
            address: DEFAULT_I2C_ADDRESS,
        }
    }

    /// Type of this transport
    pub fn transport_type(&self) -> TransportType {
        match self {
            Transport::Uart(_) => TransportType::Uart,
            Transport::I2c { .. } => TransportType::I2c,
            Transport::Spi(_) => TransportType::Spi,
            Transport::At(_) => TransportType::At,
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::I2c { address, .. } => write!(f, "I2C @ {address:#04x}"),
            other => write!(f, "{}", other.transport_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_display() {
        assert_eq!(TransportType::Uart.to_string(), "UART");
        assert_eq!(TransportType::At.to_string(), "AT");
        assert!(TransportType::Spi.is_streamed());
        assert!(!TransportType::At.is_streamed());
    }

    #[test]
    fn test_transport_kind_from_variant() {
        let uart = Transport::Uart(Box::new(MockUartPort::new()));
        assert_eq!(uart.transport_type(), TransportType::Uart);
        let i2c = Transport::i2c(Box::new(MockI2cBus::new()));
        assert_eq!(i2c.transport_type(), TransportType::I2c);
        assert_eq!(format!("{i2c:?}"), "I2C @ 0x42");
    }
}

//! Streamed-transport plumbing
//!
//! Moves bytes from a UART, I2C or SPI driver into the shared ring buffer
//! and reads them back out per cursor with time bounds.

mod fill;
mod spi;

pub use fill::{FillBudget, FillState};
pub use spi::{strip_fill, SPI_FILL};

use crate::config::SPI_FILL_THRESHOLD_MAX;
use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::ring_buffer::CursorId;
use crate::core::transport::{Transport, TransportError};

/// Register holding the number of bytes an I2C receiver has ready
pub const I2C_LENGTH_REGISTER: u8 = 0xFD;
/// Sleep between fill passes that found nothing
pub const FILL_POLL_INTERVAL_MS: u64 = 10;

impl GnssDevice {
    /// Bytes waiting at the receiver (or, on SPI, in the shadow buffer).
    pub fn stream_receive_size(&self) -> Result<usize> {
        let mut io = self.io.lock();
        match &mut *io {
            Transport::Uart(uart) => Ok(uart.pending_bytes()?),
            Transport::I2c { bus, address } => {
                bus.send(*address, &[I2C_LENGTH_REGISTER], true)?;
                let mut len = [0u8; 2];
                let n = bus.send_receive(*address, &[], &mut len)?;
                if n != len.len() {
                    return Err(TransportError::ReceiveError(format!(
                        "length register read returned {n} bytes"
                    ))
                    .into());
                }
                Ok(usize::from(u16::from_be_bytes(len)))
            }
            Transport::Spi(bus) => {
                let read_len = self.settings.spi_fill_threshold.max(1);
                let mut block = [0xFFu8; SPI_FILL_THRESHOLD_MAX];
                let n = bus.send_receive_block(&[], &mut block[..read_len])?;
                self.spi_add_received_data(&block[..n])
            }
            Transport::At(_) => Err(GnssError::NotSupported(
                "AT transport has no receive stream".to_string(),
            )),
        }
    }

    /// One pass: read what is available into `staging` and append it.
    ///
    /// Returns the bytes appended and the ring space there was beforehand.
    fn fill_pass(&self, staging: &mut [u8]) -> Result<(usize, usize)> {
        let receive_size = self.stream_receive_size()?;
        let space = self.ring.lock().available_space();
        let wanted = receive_size.min(space).min(staging.len());
        if wanted == 0 {
            return Ok((0, space));
        }

        // Drivers may have more than they reported by now
        let uart_len = space.min(staging.len());
        let n = match &mut *self.io.lock() {
            Transport::Uart(uart) => uart.read(&mut staging[..uart_len])?,
            Transport::I2c { bus, address } => bus.send_receive(*address, &[], &mut staging[..wanted])?,
            Transport::Spi(_) => self.spi_drain(&mut staging[..wanted])?,
            Transport::At(_) => 0,
        };

        if n > 0 && !self.ring.lock().append_force(&staging[..n]) {
            return Err(GnssError::OutOfMemory);
        }
        tracing::trace!("fill pass moved {} of {} bytes", n, receive_size);
        Ok((n, space))
    }

    /// Pull bytes from the transport into the ring buffer.
    ///
    /// Waits up to `timeout_ms` for the first byte, then keeps going while
    /// data flows, for at most `max_time_ms` (0 = no limit). Returns the
    /// number of bytes added; nothing at all is a [`GnssError::Timeout`].
    pub fn stream_fill(&self, timeout_ms: u64, max_time_ms: u64) -> Result<usize> {
        self.streamed("fill")?;
        let budget = FillBudget::new(self.clock.now_ms(), timeout_ms, max_time_ms);
        let mut staging = vec![0u8; self.settings.staging_buffer_length];
        let mut total = 0;
        let mut state = FillState::WaitingFirstByte;

        while state.is_running() {
            let (received, space) = match self.fill_pass(&mut staging) {
                Ok(pass) => pass,
                Err(e) => {
                    state = FillState::Failed(e);
                    break;
                }
            };
            total += received;
            if received == 0 && timeout_ms > 0 && space > 0 {
                self.clock.sleep_ms(FILL_POLL_INTERVAL_MS);
            }
            state = budget.next(received, total, space, self.clock.now_ms());
        }

        match state {
            _ if total > 0 => Ok(total),
            FillState::Failed(e) => Err(e),
            _ => Err(GnssError::Timeout),
        }
    }

    fn stream_get(
        &self,
        cursor: CursorId,
        buf: &mut [u8],
        mut offset: usize,
        max_time_ms: u64,
        consume: bool,
    ) -> Result<usize> {
        self.streamed("stream read")?;
        let start = self.clock.now_ms();
        let mut total = 0;
        let mut last_error = None;

        while total < buf.len() && self.clock.elapsed_ms(start) < max_time_ms {
            let n = {
                let mut ring = self.ring.lock();
                if consume {
                    ring.read(cursor, &mut buf[total..])
                } else {
                    let n = ring.peek(cursor, &mut buf[total..], offset);
                    offset += n;
                    n
                }
            };
            total += n;
            if n == 0 {
                match self.stream_fill(self.settings.min_fill_time_ms, max_time_ms / 10) {
                    Ok(_) | Err(GnssError::Timeout) => {}
                    Err(e) => last_error = Some(e),
                }
            }
        }

        if total > 0 {
            Ok(total)
        } else {
            Err(last_error.unwrap_or(GnssError::Timeout))
        }
    }

    /// Read and consume up to `buf.len()` bytes for `cursor`, filling from
    /// the transport as needed, within `max_time_ms`.
    pub fn stream_read(&self, cursor: CursorId, buf: &mut [u8], max_time_ms: u64) -> Result<usize> {
        self.stream_get(cursor, buf, 0, max_time_ms, true)
    }

    /// Like [`stream_read`](Self::stream_read) but leaves the data unread,
    /// starting `offset` bytes in.
    pub fn stream_peek(
        &self,
        cursor: CursorId,
        buf: &mut [u8],
        offset: usize,
        max_time_ms: u64,
    ) -> Result<usize> {
        self.stream_get(cursor, buf, offset, max_time_ms, false)
    }
}

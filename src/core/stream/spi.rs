//! SPI fill filtering
//!
//! An idle SPI receiver clocks out 0xFF. Long runs of it are padding, but a
//! short run can be genuine data inside a UBX body, so only runs at least
//! as long as the threshold are removed.

use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};

/// Byte an idle receiver sends on SPI
pub const SPI_FILL: u8 = 0xFF;

/// Remove runs of `fill` that are at least `threshold` long.
///
/// A threshold of zero turns filtering off. Otherwise a block made only of
/// `fill` is dropped whatever its length.
pub fn strip_fill(block: &[u8], fill: u8, threshold: usize) -> Vec<u8> {
    if threshold == 0 {
        return block.to_vec();
    }
    if block.iter().all(|&b| b == fill) {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(block.len());
    let mut rest = block;
    while let Some(&first) = rest.first() {
        let run = rest.iter().take_while(|&&b| b == first).count();
        if first != fill || run < threshold {
            out.extend_from_slice(&rest[..run]);
        }
        rest = &rest[run..];
    }
    out
}

impl GnssDevice {
    /// Filter bytes clocked in on SPI into the shadow buffer.
    ///
    /// Returns how many bytes the shadow buffer now holds.
    pub fn spi_add_received_data(&self, data: &[u8]) -> Result<usize> {
        let spi = self.spi.as_ref().ok_or_else(|| {
            GnssError::NotSupported(format!("no SPI shadow buffer on {}", self.transport_type))
        })?;
        let threshold = self.settings.spi_fill_threshold;
        let filtered = strip_fill(data, SPI_FILL, threshold);

        let mut shadow = spi.lock();
        let cursor = shadow.cursor;
        let keep = filtered.len().saturating_sub(shadow.ring.capacity());
        if !shadow.ring.append_force(&filtered[keep..]) {
            return Err(GnssError::OutOfMemory);
        }
        if threshold > 0 {
            // Fill can straddle two blocks
            shadow.ring.flush_matching(cursor, SPI_FILL, threshold);
        }
        Ok(shadow.ring.data_size(cursor))
    }

    /// Move up to `buf.len()` filtered bytes out of the shadow buffer.
    pub(crate) fn spi_drain(&self, buf: &mut [u8]) -> Result<usize> {
        let spi = self.spi.as_ref().ok_or_else(|| {
            GnssError::NotSupported(format!("no SPI shadow buffer on {}", self.transport_type))
        })?;
        let mut shadow = spi.lock();
        let cursor = shadow.cursor;
        Ok(shadow.ring.read(cursor, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceSettings;
    use crate::core::capability::ModuleType;
    use crate::core::transport::{MockSpiBus, Transport};

    fn spi_device() -> GnssDevice {
        GnssDevice::new(
            ModuleType::M9,
            Transport::Spi(Box::new(MockSpiBus::new())),
            DeviceSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_all_fill_block_dropped() {
        assert!(strip_fill(&[0xFF; 64], SPI_FILL, 48).is_empty());
    }

    #[test]
    fn test_short_all_fill_block_dropped() {
        assert!(strip_fill(&[0xFF; 10], SPI_FILL, 48).is_empty());
        assert!(strip_fill(&[0xFF], SPI_FILL, 48).is_empty());
    }

    #[test]
    fn test_threshold_zero_disables() {
        assert_eq!(strip_fill(&[0xFF; 4], SPI_FILL, 0), vec![0xFF; 4]);
    }

    #[test]
    fn test_short_runs_kept_long_runs_removed() {
        let mut block = vec![0xB5, 0x62, 0xFF, 0xFF, 0x01];
        block.extend_from_slice(&[0xFF; 5]);
        block.push(0x02);
        assert_eq!(
            strip_fill(&block, SPI_FILL, 3),
            vec![0xB5, 0x62, 0xFF, 0xFF, 0x01, 0x02]
        );
    }

    #[test]
    fn test_trailing_fill_removed() {
        let mut block = vec![0x24, 0x47];
        block.extend_from_slice(&[0xFF; 10]);
        assert_eq!(strip_fill(&block, SPI_FILL, 4), vec![0x24, 0x47]);
    }

    #[test]
    fn test_short_fill_chunk_never_buffered() {
        let dev = spi_device();
        // Idle bytes clocked in while sending an 8-byte poll
        assert_eq!(dev.spi_add_received_data(&[0xFF; 8]).unwrap(), 0);
        assert_eq!(dev.spi_add_received_data(&[0xB5, 0x62, 0xFF]).unwrap(), 3);
        let mut buf = [0u8; 8];
        assert_eq!(dev.spi_drain(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0xB5, 0x62, 0xFF]);
    }
}

//! A GNSS receiver as seen by the driver
//!
//! [`GnssDevice`] owns the transport, the shared receive ring buffer with the
//! driver's private cursor, the SPI shadow buffer and the two locks:
//! - `transport_lock` serialises whole request/response exchanges
//! - `io` guards each individual driver primitive, so the message receive
//!   worker can keep filling between the steps of an exchange

use crate::config::{DeviceSettings, SPI_FILL_THRESHOLD_MAX};
use crate::core::capability::{Feature, ModuleType};
use crate::core::clock::{Clock, SystemClock};
use crate::core::error::{GnssError, Result};
use crate::core::ring_buffer::{CursorId, RingBuffer};
use crate::core::transport::{Transport, TransportType};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ring of filtered SPI input with the single cursor that drains it
#[derive(Debug)]
pub(crate) struct SpiShadow {
    pub(crate) ring: RingBuffer,
    pub(crate) cursor: CursorId,
}

/// One attached receiver
pub struct GnssDevice {
    pub(crate) module: ModuleType,
    pub(crate) transport_type: TransportType,
    pub(crate) settings: DeviceSettings,
    pub(crate) io: Mutex<Transport>,
    pub(crate) transport_lock: Mutex<()>,
    pub(crate) ring: Mutex<RingBuffer>,
    pub(crate) private_cursor: CursorId,
    pub(crate) spi: Option<Mutex<SpiShadow>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl GnssDevice {
    /// Attach to a receiver using real time.
    pub fn new(module: ModuleType, transport: Transport, settings: DeviceSettings) -> Result<Self> {
        Self::with_clock(module, transport, settings, Arc::new(SystemClock::new()))
    }

    /// Attach to a receiver with an explicit time source.
    pub fn with_clock(
        module: ModuleType,
        transport: Transport,
        settings: DeviceSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if settings.spi_fill_threshold > SPI_FILL_THRESHOLD_MAX {
            return Err(GnssError::InvalidParameter(format!(
                "SPI fill threshold {} exceeds {SPI_FILL_THRESHOLD_MAX}",
                settings.spi_fill_threshold
            )));
        }
        if settings.ring_buffer_length == 0 || settings.staging_buffer_length == 0 {
            return Err(GnssError::InvalidParameter(
                "buffer lengths must be non-zero".to_string(),
            ));
        }

        let transport_type = transport.transport_type();
        let mut ring = RingBuffer::new(settings.ring_buffer_length);
        let private_cursor = ring.acquire_cursor()?;

        let spi = if transport_type == TransportType::Spi {
            let mut shadow = RingBuffer::new(settings.spi_buffer_length);
            let cursor = shadow.acquire_cursor()?;
            Some(Mutex::new(SpiShadow {
                ring: shadow,
                cursor,
            }))
        } else {
            None
        };

        tracing::debug!("{} module attached over {}", module, transport_type);
        Ok(Self {
            module,
            transport_type,
            settings,
            io: Mutex::new(transport),
            transport_lock: Mutex::new(()),
            ring: Mutex::new(ring),
            private_cursor,
            spi,
            clock,
        })
    }

    /// Receiver generation
    pub fn module(&self) -> ModuleType {
        self.module
    }

    /// Whether the module has `feature`
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.module.has(feature)
    }

    /// How the receiver is attached
    pub fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    /// Driver settings
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Time source
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The driver's own cursor into the receive ring buffer
    pub fn private_cursor(&self) -> CursorId {
        self.private_cursor
    }

    /// Hand out another cursor into the receive ring buffer.
    pub fn acquire_cursor(&self) -> Result<CursorId> {
        self.ring.lock().acquire_cursor()
    }

    /// Give a cursor from [`acquire_cursor`](Self::acquire_cursor) back.
    pub fn release_cursor(&self, cursor: CursorId) {
        self.ring.lock().release_cursor(cursor);
    }

    /// Unread bytes for a cursor
    pub fn data_size(&self, cursor: CursorId) -> usize {
        self.ring.lock().data_size(cursor)
    }

    /// Bytes a forced append could accept right now
    pub fn available_space(&self) -> usize {
        self.ring.lock().available_space()
    }

    pub(crate) fn streamed(&self, operation: &str) -> Result<()> {
        if self.transport_type.is_streamed() {
            Ok(())
        } else {
            Err(GnssError::NotSupported(format!(
                "{operation} needs a streamed transport, not {}",
                self.transport_type
            )))
        }
    }
}

impl std::fmt::Debug for GnssDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GnssDevice")
            .field("module", &self.module)
            .field("transport", &self.transport_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockSpiBus, MockUartPort};

    #[test]
    fn test_spi_threshold_limit() {
        let settings = DeviceSettings {
            spi_fill_threshold: SPI_FILL_THRESHOLD_MAX + 1,
            ..DeviceSettings::default()
        };
        let result = GnssDevice::new(
            ModuleType::M8,
            Transport::Spi(Box::new(MockSpiBus::new())),
            settings,
        );
        assert!(matches!(result, Err(GnssError::InvalidParameter(_))));
    }

    #[test]
    fn test_shadow_buffer_only_on_spi() {
        let uart = GnssDevice::new(
            ModuleType::M9,
            Transport::Uart(Box::new(MockUartPort::new())),
            DeviceSettings::default(),
        )
        .unwrap();
        assert!(uart.spi.is_none());
        assert!(uart.has_feature(Feature::CfgValXxx));

        let spi = GnssDevice::new(
            ModuleType::M8,
            Transport::Spi(Box::new(MockSpiBus::new())),
            DeviceSettings::default(),
        )
        .unwrap();
        assert!(spi.spi.is_some());
        assert_eq!(spi.available_space(), 2048);
    }
}

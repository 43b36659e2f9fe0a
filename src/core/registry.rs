//! Owner of every attached device
//!
//! Devices are addressed by a [`DeviceHandle`]; each may have one running
//! [`MessageReceiver`]. Removing a device stops its receiver first.

use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::msg_receive::{MessageCallback, MessageReceiver, ReaderId};
use crate::core::protocol::message_id::MessageId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle to a registered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u32);

struct Entry {
    device: Arc<GnssDevice>,
    receiver: Option<MessageReceiver>,
}

/// Registry of attached devices
#[derive(Default)]
pub struct DeviceRegistry {
    next: Mutex<u32>,
    entries: Mutex<HashMap<DeviceHandle, Entry>>,
}

impl DeviceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a device.
    pub fn add(&self, device: GnssDevice) -> DeviceHandle {
        let handle = {
            let mut next = self.next.lock();
            let handle = DeviceHandle(*next);
            *next = next.wrapping_add(1);
            handle
        };
        self.entries.lock().insert(
            handle,
            Entry {
                device: Arc::new(device),
                receiver: None,
            },
        );
        handle
    }

    /// Shared access to a device
    pub fn get(&self, handle: DeviceHandle) -> Option<Arc<GnssDevice>> {
        self.entries.lock().get(&handle).map(|e| Arc::clone(&e.device))
    }

    /// Remove a device, stopping its message receive.
    pub fn remove(&self, handle: DeviceHandle) -> Option<Arc<GnssDevice>> {
        let entry = self.entries.lock().remove(&handle)?;
        if let Some(receiver) = entry.receiver {
            receiver.stop();
        }
        Some(entry.device)
    }

    /// Remove every device.
    pub fn clear(&self) {
        let entries: Vec<Entry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            if let Some(receiver) = entry.receiver {
                receiver.stop();
            }
        }
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Handles in registration order
    pub fn handles(&self) -> Vec<DeviceHandle> {
        let mut handles: Vec<_> = self.entries.lock().keys().copied().collect();
        handles.sort();
        handles
    }

    fn unknown(handle: DeviceHandle) -> GnssError {
        GnssError::InvalidParameter(format!("no device {}", handle.0))
    }

    /// Start message receive on a device (no-op if already running).
    pub fn start_message_receive(&self, handle: DeviceHandle) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&handle).ok_or_else(|| Self::unknown(handle))?;
        if entry.receiver.is_none() {
            entry.receiver = Some(MessageReceiver::start(Arc::clone(&entry.device))?);
        }
        Ok(())
    }

    /// Register a reader on a device's running message receive.
    pub fn add_message_reader(
        &self,
        handle: DeviceHandle,
        wanted: MessageId,
        callback: MessageCallback,
    ) -> Result<ReaderId> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&handle).ok_or_else(|| Self::unknown(handle))?;
        let receiver = entry.receiver.as_mut().ok_or_else(|| {
            GnssError::InvalidParameter("message receive is not running".to_string())
        })?;
        Ok(receiver.add_reader(wanted, callback))
    }

    /// Remove a reader from a device's message receive.
    pub fn remove_message_reader(&self, handle: DeviceHandle, reader: ReaderId) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&handle).ok_or_else(|| Self::unknown(handle))?;
        let removed = entry
            .receiver
            .as_mut()
            .is_some_and(|receiver| receiver.remove_reader(reader));
        if removed {
            Ok(())
        } else {
            Err(GnssError::InvalidParameter("no such reader".to_string()))
        }
    }

    /// Stop message receive on a device.
    pub fn stop_message_receive(&self, handle: DeviceHandle) -> Result<()> {
        let receiver = {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(&handle).ok_or_else(|| Self::unknown(handle))?;
            entry.receiver.take()
        };
        if let Some(receiver) = receiver {
            receiver.stop();
        }
        Ok(())
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceSettings;
    use crate::core::capability::ModuleType;
    use crate::core::transport::{MockUartPort, Transport};

    fn device() -> GnssDevice {
        GnssDevice::new(
            ModuleType::M10,
            Transport::Uart(Box::new(MockUartPort::new())),
            DeviceSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_add_get_remove() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        let a = registry.add(device());
        let b = registry.add(device());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handles(), vec![a, b]);
        assert_eq!(registry.get(a).unwrap().module(), ModuleType::M10);

        assert!(registry.remove(a).is_some());
        assert!(registry.get(a).is_none());
        assert!(registry.remove(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reader_needs_running_receive() {
        let registry = DeviceRegistry::new();
        let h = registry.add(device());
        assert!(registry
            .add_message_reader(h, MessageId::All, Box::new(|_, _| {}))
            .is_err());
        assert!(registry.stop_message_receive(h).is_ok());
    }
}

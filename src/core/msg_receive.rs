//! Background delivery of received messages
//!
//! A [`MessageReceiver`] owns its own cursor into the device's ring buffer
//! and a worker thread that fills, decodes any frame and hands it to every
//! registered reader whose filter matches. The worker never takes the
//! transport lock, so request/response exchanges run alongside it.

use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::protocol::message_id::MessageId;
use crate::core::ring_buffer::CursorId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long one worker pass waits for a frame
pub const RECEIVE_POLL_MS: u64 = 1000;
/// Pause after a pass that failed with something other than a timeout
pub const RETRY_DELAY_MS: u64 = 10;

/// Called with the identity and complete frame of each matching message
pub type MessageCallback = Box<dyn FnMut(&MessageId, &[u8]) + Send>;

/// Handle to a registered reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(u32);

struct Reader {
    id: ReaderId,
    wanted: MessageId,
    callback: MessageCallback,
}

type Readers = Arc<Mutex<Vec<Reader>>>;

/// Worker thread delivering messages to readers
pub struct MessageReceiver {
    device: Arc<GnssDevice>,
    cursor: CursorId,
    readers: Readers,
    next_reader: u32,
    exit_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: Option<JoinHandle<()>>,
}

impl MessageReceiver {
    /// Start receiving on a streamed device.
    pub fn start(device: Arc<GnssDevice>) -> Result<Self> {
        device.streamed("message receive")?;
        let cursor = device.acquire_cursor()?;
        let readers: Readers = Arc::new(Mutex::new(Vec::new()));
        let (exit_tx, exit_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker_device = Arc::clone(&device);
        let worker_readers = Arc::clone(&readers);
        let worker = thread::Builder::new()
            .name("gnss-msg-receive".to_string())
            .spawn(move || {
                run(&worker_device, cursor, &worker_readers, &exit_rx);
                // The cursor stays taken until the worker stops using it
                worker_readers.lock().clear();
                worker_device.release_cursor(cursor);
                let _ = done_tx.send(());
            });
        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                device.release_cursor(cursor);
                return Err(GnssError::Platform(format!(
                    "could not start message receive: {e}"
                )));
            }
        };

        tracing::debug!("message receive started");
        Ok(Self {
            device,
            cursor,
            readers,
            next_reader: 0,
            exit_tx,
            done_rx,
            worker: Some(worker),
        })
    }

    /// Deliver messages matching `wanted` to `callback`.
    ///
    /// The callback runs on the worker thread and must not add or remove
    /// readers itself.
    pub fn add_reader(&mut self, wanted: MessageId, callback: MessageCallback) -> ReaderId {
        let id = ReaderId(self.next_reader);
        self.next_reader = self.next_reader.wrapping_add(1);
        self.readers.lock().push(Reader {
            id,
            wanted,
            callback,
        });
        id
    }

    /// Stop delivering to a reader. Returns false if it was not registered.
    pub fn remove_reader(&mut self, id: ReaderId) -> bool {
        let mut readers = self.readers.lock();
        let before = readers.len();
        readers.retain(|r| r.id != id);
        readers.len() != before
    }

    /// Number of registered readers
    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    /// Whether the worker is still running
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker, drop every reader and give the cursor back.
    ///
    /// Waits up to `receive_task_grace_ms`; a worker still busy after that
    /// is left to finish and releases the cursor itself.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        let _ = self.exit_tx.try_send(());
        let grace = Duration::from_millis(self.device.settings().receive_task_grace_ms);
        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::warn!("message receive worker panicked");
                    self.readers.lock().clear();
                    self.device.release_cursor(self.cursor);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "message receive worker did not exit within {:?}, its cursor stays held until it does",
                    grace
                );
                return;
            }
        }
        tracing::debug!("message receive stopped");
    }
}

impl Drop for MessageReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn exit_requested(exit_rx: &Receiver<()>) -> bool {
    !matches!(exit_rx.try_recv(), Err(TryRecvError::Empty))
}

fn run(device: &GnssDevice, cursor: CursorId, readers: &Readers, exit_rx: &Receiver<()>) {
    let keep_going = || exit_rx.is_empty();
    while !exit_requested(exit_rx) {
        match device.receive_stream_message(&MessageId::Any, cursor, RECEIVE_POLL_MS, Some(&keep_going)) {
            Ok(message) => {
                for reader in readers.lock().iter_mut() {
                    if message.id.is_wanted_by(&reader.wanted) {
                        (reader.callback)(&message.id, &message.data);
                    }
                }
            }
            Err(GnssError::Timeout) => {}
            Err(e) => {
                tracing::warn!("message receive: {}", e);
                // Doubles as the exit wait
                if exit_rx.recv_timeout(Duration::from_millis(RETRY_DELAY_MS))
                    != Err(RecvTimeoutError::Timeout)
                {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceSettings;
    use crate::core::capability::ModuleType;
    use crate::core::protocol::ubx;
    use crate::core::transport::{MockUartPort, Transport};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn idle_device() -> Arc<GnssDevice> {
        let mut uart = MockUartPort::new();
        uart.expect_pending_bytes().returning(|| Ok(0));
        uart.expect_read().returning(|_| Ok(0));
        let settings = DeviceSettings {
            min_fill_time_ms: 10,
            ..DeviceSettings::default()
        };
        Arc::new(GnssDevice::new(ModuleType::M9, Transport::Uart(Box::new(uart)), settings).unwrap())
    }

    #[test]
    fn test_start_stop() {
        let device = idle_device();
        let receiver = MessageReceiver::start(Arc::clone(&device)).unwrap();
        assert!(receiver.is_running());
        receiver.stop();
        // Only the driver's own cursor is left
        let cursors: Vec<_> = (0..7).map(|_| device.acquire_cursor().unwrap()).collect();
        assert_eq!(cursors.len(), 7);
    }

    #[test]
    fn test_reader_bookkeeping() {
        let mut receiver = MessageReceiver::start(idle_device()).unwrap();
        let a = receiver.add_reader(MessageId::All, Box::new(|_, _| {}));
        let b = receiver.add_reader(MessageId::ubx(0x01, 0x07), Box::new(|_, _| {}));
        assert_ne!(a, b);
        assert_eq!(receiver.reader_count(), 2);
        assert!(receiver.remove_reader(a));
        assert!(!receiver.remove_reader(a));
        assert_eq!(receiver.reader_count(), 1);
    }

    #[test]
    fn test_drop_stops_worker() {
        let device = idle_device();
        drop(MessageReceiver::start(Arc::clone(&device)).unwrap());
        assert_eq!(Arc::strong_count(&device), 1);
    }

    /// A device that produces one UBX frame once `go` is set
    fn one_frame_device(go: &Arc<AtomicBool>) -> Arc<GnssDevice> {
        let frame = ubx::encode(0x01, 0x07, &[0; 4]).unwrap();
        let len = frame.len();
        let sent = Arc::new(AtomicBool::new(false));

        let mut uart = MockUartPort::new();
        let (go_p, sent_p) = (Arc::clone(go), Arc::clone(&sent));
        uart.expect_pending_bytes().returning(move || {
            let ready = go_p.load(Ordering::SeqCst) && !sent_p.load(Ordering::SeqCst);
            Ok(if ready { len } else { 0 })
        });
        let go_r = Arc::clone(go);
        uart.expect_read().returning(move |buf| {
            if go_r.load(Ordering::SeqCst) && !sent.swap(true, Ordering::SeqCst) {
                buf[..len].copy_from_slice(&frame);
                Ok(len)
            } else {
                Ok(0)
            }
        });
        let settings = DeviceSettings {
            min_fill_time_ms: 10,
            receive_task_grace_ms: 50,
            ..DeviceSettings::default()
        };
        Arc::new(GnssDevice::new(ModuleType::M9, Transport::Uart(Box::new(uart)), settings).unwrap())
    }

    #[test]
    fn test_slow_worker_keeps_cursor_until_it_exits() {
        let go = Arc::new(AtomicBool::new(false));
        let device = one_frame_device(&go);
        let mut receiver = MessageReceiver::start(Arc::clone(&device)).unwrap();

        let (entered_tx, entered_rx) = bounded::<()>(1);
        receiver.add_reader(
            MessageId::All,
            Box::new(move |_, _| {
                let _ = entered_tx.try_send(());
                thread::sleep(Duration::from_millis(500));
            }),
        );
        go.store(true, Ordering::SeqCst);
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Grace period runs out while the callback is still sleeping
        receiver.stop();
        let free: Vec<_> = (0..6).map(|_| device.acquire_cursor().unwrap()).collect();
        assert!(device.acquire_cursor().is_err());
        for cursor in free {
            device.release_cursor(cursor);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&device) > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(Arc::strong_count(&device), 1);
        let free: Vec<_> = (0..7).map(|_| device.acquire_cursor().unwrap()).collect();
        assert_eq!(free.len(), 7);
    }
}

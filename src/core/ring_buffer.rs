//! Multi-reader ring buffer
//!
//! One producer appends, any number of cursors read independently. Positions
//! are absolute byte counts, so a cursor that fell behind is detected by
//! comparing against the oldest position still stored. A locked cursor is
//! never overrun: forced appends that would lose its data are refused.

use crate::core::error::{GnssError, Result};
use crate::core::protocol::framing::{self, Scan};
use parking_lot::Mutex;

/// Most cursors a buffer hands out
pub const MAX_CURSORS: usize = 8;

/// Handle to one reader of a [`RingBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(usize);

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    read: u64,
    locks: u32,
}

/// Fixed-capacity byte ring with independent read cursors
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    written: u64,
    cursors: Vec<Option<Cursor>>,
}

impl RingBuffer {
    /// Create a ring holding up to `capacity` bytes (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity.max(1)].into_boxed_slice(),
            written: 0,
            cursors: vec![None; MAX_CURSORS],
        }
    }

    /// Bytes the ring can hold
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn oldest(&self) -> u64 {
        self.written.saturating_sub(self.capacity() as u64)
    }

    fn cursor(&self, id: CursorId) -> Option<&Cursor> {
        self.cursors.get(id.0)?.as_ref()
    }

    fn cursor_mut(&mut self, id: CursorId) -> Option<&mut Cursor> {
        self.cursors.get_mut(id.0)?.as_mut()
    }

    /// Hand out a new cursor positioned at the current head.
    pub fn acquire_cursor(&mut self) -> Result<CursorId> {
        let written = self.written;
        let slot = self
            .cursors
            .iter()
            .position(Option::is_none)
            .ok_or(GnssError::OutOfMemory)?;
        self.cursors[slot] = Some(Cursor {
            read: written,
            locks: 0,
        });
        Ok(CursorId(slot))
    }

    /// Give a cursor back.
    pub fn release_cursor(&mut self, id: CursorId) {
        if let Some(slot) = self.cursors.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Protect a cursor's unread data from forced appends. Nests.
    pub fn lock_cursor(&mut self, id: CursorId) {
        if let Some(c) = self.cursor_mut(id) {
            c.locks += 1;
        }
    }

    /// Undo one [`lock_cursor`](Self::lock_cursor).
    pub fn unlock_cursor(&mut self, id: CursorId) {
        if let Some(c) = self.cursor_mut(id) {
            c.locks = c.locks.saturating_sub(1);
        }
    }

    /// Whether the cursor is currently locked
    pub fn is_locked(&self, id: CursorId) -> bool {
        self.cursor(id).is_some_and(|c| c.locks > 0)
    }

    /// Unread bytes for a cursor
    pub fn data_size(&self, id: CursorId) -> usize {
        self.cursor(id)
            .map_or(0, |c| (self.written - c.read) as usize)
    }

    /// Bytes that can be force-appended without overrunning a locked cursor
    pub fn available_space(&self) -> usize {
        let held = self
            .cursors
            .iter()
            .flatten()
            .filter(|c| c.locks > 0)
            .map(|c| (self.written - c.read) as usize)
            .max()
            .unwrap_or(0);
        self.capacity() - held
    }

    /// Append, dragging unlocked cursors forward past overwritten data.
    ///
    /// Returns false, writing nothing, if a locked cursor would lose data.
    pub fn append_force(&mut self, data: &[u8]) -> bool {
        if data.len() > self.available_space() {
            return false;
        }
        let cap = self.capacity();
        let start = (self.written % cap as u64) as usize;
        let first = data.len().min(cap - start);
        self.storage[start..start + first].copy_from_slice(&data[..first]);
        self.storage[..data.len() - first].copy_from_slice(&data[first..]);
        self.written += data.len() as u64;

        let oldest = self.oldest();
        for c in self.cursors.iter_mut().flatten() {
            if c.read < oldest {
                c.read = oldest;
            }
        }
        true
    }

    /// Unread data of a cursor as (up to) two slices
    pub fn slices(&self, id: CursorId) -> (&[u8], &[u8]) {
        let Some(c) = self.cursor(id) else {
            return (&[], &[]);
        };
        let cap = self.capacity();
        let len = (self.written - c.read) as usize;
        let start = (c.read % cap as u64) as usize;
        let first = len.min(cap - start);
        (
            &self.storage[start..start + first],
            &self.storage[..len - first],
        )
    }

    fn copy_out(&self, id: CursorId, offset: usize, buf: &mut [u8]) -> usize {
        let (head, tail) = self.slices(id);
        let mut copied = 0;
        let mut skip = offset;
        for part in [head, tail] {
            if skip >= part.len() {
                skip -= part.len();
                continue;
            }
            let part = &part[skip..];
            skip = 0;
            let n = part.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&part[..n]);
            copied += n;
        }
        copied
    }

    /// Copy without consuming, starting `offset` bytes into the unread data.
    pub fn peek(&self, id: CursorId, buf: &mut [u8], offset: usize) -> usize {
        self.copy_out(id, offset, buf)
    }

    /// Copy and consume.
    pub fn read(&mut self, id: CursorId, buf: &mut [u8]) -> usize {
        let n = self.copy_out(id, 0, buf);
        self.discard(id, n)
    }

    /// Consume up to `count` bytes without copying them.
    pub fn discard(&mut self, id: CursorId, count: usize) -> usize {
        let n = count.min(self.data_size(id));
        if let Some(c) = self.cursor_mut(id) {
            c.read += n as u64;
        }
        n
    }

    /// Consume everything unread.
    pub fn flush(&mut self, id: CursorId) {
        let written = self.written;
        if let Some(c) = self.cursor_mut(id) {
            c.read = written;
        }
    }

    /// Drop a leading run of `value` if it is at least `min_run` long.
    pub fn flush_matching(&mut self, id: CursorId, value: u8, min_run: usize) -> usize {
        let (head, tail) = self.slices(id);
        let run = head
            .iter()
            .chain(tail)
            .take_while(|&&b| b == value)
            .count();
        if run > 0 && run >= min_run {
            self.discard(id, run)
        } else {
            0
        }
    }

    /// Classify the frame at the head of a cursor's unread data.
    pub fn scan(&self, id: CursorId) -> Scan {
        let (head, tail) = self.slices(id);
        framing::scan(head, tail)
    }
}

/// Keeps a cursor locked for as long as it lives
pub struct CursorGuard<'a> {
    ring: &'a Mutex<RingBuffer>,
    cursor: CursorId,
}

impl<'a> CursorGuard<'a> {
    /// Lock `cursor` until the guard is dropped.
    pub fn new(ring: &'a Mutex<RingBuffer>, cursor: CursorId) -> Self {
        ring.lock().lock_cursor(cursor);
        Self { ring, cursor }
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        self.ring.lock().unlock_cursor(self.cursor);
    }
}

//! Frame scanning over buffered receiver output
//!
//! The ring buffer hands its unread bytes over as (up to) two slices; a
//! [`ParseCursor`] walks them as one sequence. [`scan`] tries every protocol
//! parser at each offset and classifies the head of the data as a frame,
//! garbage to discard, or an incomplete frame to wait for.

use super::message_id::MessageId;
use super::{nmea, rtcm, ubx};

/// Why a parser did not produce a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Plausible start of a frame, but the bytes ran out
    Timeout,
    /// Definitely not this protocol at this offset
    NotFound,
}

/// Read-only walk over the two halves of a wrapped buffer
#[derive(Debug, Clone)]
pub struct ParseCursor<'a> {
    head: &'a [u8],
    tail: &'a [u8],
    pos: usize,
}

impl<'a> ParseCursor<'a> {
    /// Cursor over `head` followed by `tail`
    pub fn new(head: &'a [u8], tail: &'a [u8]) -> Self {
        Self { head, tail, pos: 0 }
    }

    /// Cursor over a single contiguous slice
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(data, &[])
    }

    fn starting_at(head: &'a [u8], tail: &'a [u8], pos: usize) -> Self {
        Self { head, tail, pos }
    }

    /// Next byte, or `None` once both halves are exhausted
    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = if self.pos < self.head.len() {
            self.head[self.pos]
        } else {
            *self.tail.get(self.pos - self.head.len())?
        };
        self.pos += 1;
        Some(byte)
    }

    /// Bytes not yet walked
    pub fn remaining(&self) -> usize {
        (self.head.len() + self.tail.len()).saturating_sub(self.pos)
    }

    /// Bytes walked since the start of the data
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// A protocol frame parser: consume one frame from the cursor
pub type FrameParser = fn(&mut ParseCursor<'_>) -> Result<MessageId, ParseError>;

/// Parsers tried, in order, at every offset
pub const PARSERS: [FrameParser; 3] = [ubx::parse, nmea::parse, rtcm::parse];

/// What sits at the head of the buffered data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// A complete frame of `len` bytes starting at offset 0
    Frame {
        /// Identity of the frame
        id: MessageId,
        /// Frame length including all framing bytes
        len: usize,
    },
    /// `len` leading bytes belong to no frame
    Garbage(usize),
    /// A frame may start at offset 0 but is not complete yet
    Incomplete,
}

/// Classify the data at the head of `head` + `tail`.
pub fn scan(head: &[u8], tail: &[u8]) -> Scan {
    let total = head.len() + tail.len();
    let mut offset = 0;

    while offset < total {
        let mut waiting = false;
        for parser in PARSERS {
            let mut cursor = ParseCursor::starting_at(head, tail, offset);
            match parser(&mut cursor) {
                Ok(id) if offset == 0 => {
                    return Scan::Frame {
                        id,
                        len: cursor.position(),
                    }
                }
                Ok(_) => return Scan::Garbage(offset),
                Err(ParseError::Timeout) => waiting = true,
                Err(ParseError::NotFound) => {}
            }
        }
        if waiting {
            break;
        }
        offset += 1;
    }

    if offset > 0 {
        Scan::Garbage(offset)
    } else {
        Scan::Incomplete
    }
}

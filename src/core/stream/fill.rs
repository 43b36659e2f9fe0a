//! Fill loop state machine
//!
//! A fill waits up to `timeout_ms` for the first byte, then keeps draining
//! while bytes keep arriving, bounded by `max_time_ms` (0 = unbounded).

use crate::core::error::GnssError;

/// Where a fill loop is
#[derive(Debug)]
pub enum FillState {
    /// Nothing has arrived yet
    WaitingFirstByte,
    /// Bytes are arriving
    Draining,
    /// Finished normally
    Done,
    /// A transport primitive failed
    Failed(GnssError),
}

impl FillState {
    /// Whether another read pass should run
    pub fn is_running(&self) -> bool {
        matches!(self, Self::WaitingFirstByte | Self::Draining)
    }
}

/// Time budget of one fill
#[derive(Debug, Clone, Copy)]
pub struct FillBudget {
    start_ms: u64,
    timeout_ms: u64,
    max_time_ms: u64,
}

impl FillBudget {
    /// Budget starting at `start_ms`
    pub fn new(start_ms: u64, timeout_ms: u64, max_time_ms: u64) -> Self {
        Self {
            start_ms,
            timeout_ms,
            max_time_ms,
        }
    }

    /// State after a pass that read `received` bytes (`total` so far) with
    /// `space` bytes of ring buffer available at its start.
    pub fn next(&self, received: usize, total: usize, space: usize, now_ms: u64) -> FillState {
        let elapsed = now_ms.saturating_sub(self.start_ms);
        if self.timeout_ms == 0 || space == 0 {
            return FillState::Done;
        }
        if total == 0 {
            return if elapsed < self.timeout_ms {
                FillState::WaitingFirstByte
            } else {
                FillState::Done
            };
        }
        if received > 0 && (self.max_time_ms == 0 || elapsed < self.max_time_ms) {
            FillState::Draining
        } else {
            FillState::Done
        }
    }
}

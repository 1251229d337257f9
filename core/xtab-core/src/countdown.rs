//! Cancellable friction countdown.
//!
//! The UI ticks this once per second. Only [`CountdownStep::Complete`] allows
//! the pending transition to be committed; a cancelled countdown commits
//! nothing.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Remaining(u64),
    Complete,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u64,
    cancelled: bool,
}

impl Countdown {
    pub fn new(seconds: u64) -> Self {
        Self {
            remaining: seconds,
            cancelled: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Advances one second.
    pub fn tick(&mut self) -> CountdownStep {
        if self.cancelled {
            return CountdownStep::Cancelled;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            CountdownStep::Complete
        } else {
            CountdownStep::Remaining(self.remaining)
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

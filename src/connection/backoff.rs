use std::time::Duration;

/// Reconnection bookkeeping: attempt counter with exponential, unjittered
/// backoff and a hard attempt ceiling.
///
/// Not exposed outside the connection module. The counter is reset only by
/// a successful connection, so a later transient failure restarts the
/// schedule from the base delay.
pub(crate) struct ReconnectState {
    attempts: u32,
    base_delay: Duration,
    max_attempts: u32,
}

impl ReconnectState {
    pub(crate) fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            base_delay,
            max_attempts,
        }
    }

    /// Delay before the next attempt: `base_delay * 2^(n-1)` for attempt n.
    ///
    /// Returns `None` once the ceiling is reached — no further automatic
    /// attempts; the caller must reconnect manually.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        // max_attempts comes straight from config and may exceed the width
        // of the shift; large ceilings saturate at the widest delay
        let factor = 2u32.checked_pow(self.attempts - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }

    /// Zero the counter after a successful connection.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

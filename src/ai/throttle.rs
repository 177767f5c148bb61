//! Throttle with a guaranteed trailing flush.

/// Whether a flush is waiting to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushState {
    #[default]
    Idle,
    Scheduled { due_ms: u64 },
}

/// Coalesces bursts of updates into at most one flush per `delay_ms`.
///
/// The first [`schedule`](Self::schedule) after a flush arms the timer;
/// further calls before it fires change nothing. The owner performs the
/// final flush itself when the stream ends, so trailing data is never lost.
///
/// ```
/// use marksync::ai::FlushThrottle;
///
/// let mut throttle = FlushThrottle::new(60);
/// assert!(throttle.schedule(0));
/// assert!(!throttle.schedule(10));
/// assert!(!throttle.take_ready(59));
/// assert!(throttle.take_ready(60));
/// assert!(throttle.schedule(70));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FlushThrottle {
    delay_ms: u64,
    state: FlushState,
}

impl FlushThrottle {
    pub const fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            state: FlushState::Idle,
        }
    }

    pub const fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub const fn state(&self) -> FlushState {
        self.state
    }

    /// Arm the timer if idle. Returns true if this call armed it.
    pub const fn schedule(&mut self, now_ms: u64) -> bool {
        match self.state {
            FlushState::Idle => {
                self.state = FlushState::Scheduled {
                    due_ms: now_ms.saturating_add(self.delay_ms),
                };
                true
            }
            FlushState::Scheduled { .. } => false,
        }
    }

    /// Returns true, and goes idle, if the armed flush is due.
    pub const fn take_ready(&mut self, now_ms: u64) -> bool {
        match self.state {
            FlushState::Scheduled { due_ms } if due_ms <= now_ms => {
                self.state = FlushState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Disarm without flushing.
    pub const fn cancel(&mut self) {
        self.state = FlushState::Idle;
    }

    pub const fn deadline(&self) -> Option<u64> {
        match self.state {
            FlushState::Idle => None,
            FlushState::Scheduled { due_ms } => Some(due_ms),
        }
    }

    pub const fn is_scheduled(&self) -> bool {
        matches!(self.state, FlushState::Scheduled { .. })
    }
}

impl Default for FlushThrottle {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_throttle_never_fires() {
        let mut throttle = FlushThrottle::default();
        assert!(!throttle.take_ready(u64::MAX));
        assert_eq!(throttle.deadline(), None);
    }

    #[test]
    fn test_schedule_while_armed_keeps_first_deadline() {
        let mut throttle = FlushThrottle::new(60);
        throttle.schedule(100);
        throttle.schedule(150);
        assert_eq!(throttle.deadline(), Some(160));
    }

    #[test]
    fn test_cancel_disarms() {
        let mut throttle = FlushThrottle::new(60);
        throttle.schedule(0);
        throttle.cancel();
        assert!(!throttle.is_scheduled());
        assert!(!throttle.take_ready(1000));
    }

    #[test]
    fn test_zero_delay_is_ready_immediately() {
        let mut throttle = FlushThrottle::new(0);
        throttle.schedule(5);
        assert!(throttle.take_ready(5));
    }
}

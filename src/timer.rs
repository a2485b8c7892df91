//! Software one-shot timer for the duty-cycle and join-backoff deadlines.
//!
//! Single-writer, single-reader: only the session state machine touches it,
//! always from main-loop context, so there is no masking to do here. At most
//! one deadline is ever pending; arming stops any prior one first.

/// One-shot millisecond timer checked against the software tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTimer {
    deadline_ms: u32,
    armed: bool,
}

impl EventTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer `interval_ms` from `now_ms`, cancelling any pending
    /// deadline. A cancelled deadline can never fire after the rearm.
    pub fn arm(&mut self, now_ms: u32, interval_ms: u32) {
        self.stop();
        self.deadline_ms = now_ms.wrapping_add(interval_ms);
        self.armed = true;
    }

    pub fn stop(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Pending deadline, if armed.
    pub fn deadline_ms(&self) -> Option<u32> {
        self.armed.then_some(self.deadline_ms)
    }

    /// True exactly once per armed deadline: firing disarms.
    /// Wrapping-safe for intervals below half the u32 range.
    pub fn fired(&mut self, now_ms: u32) -> bool {
        if self.armed && now_ms.wrapping_sub(self.deadline_ms) < u32::MAX / 2 {
            self.armed = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::EventTimer;

    #[test]
    fn fires_once_at_deadline() {
        let mut t = EventTimer::new();
        t.arm(1000, 500);
        assert!(!t.fired(1499));
        assert!(t.fired(1500));
        assert!(!t.fired(1500));
        assert!(!t.is_armed());
    }

    #[test]
    fn rearm_cancels_pending_deadline() {
        let mut t = EventTimer::new();
        t.arm(0, 100);
        t.arm(50, 1000);
        assert!(!t.fired(100));
        assert_eq!(t.deadline_ms(), Some(1050));
        assert!(t.fired(1050));
    }

    #[test]
    fn stop_prevents_firing() {
        let mut t = EventTimer::new();
        t.arm(0, 100);
        t.stop();
        assert!(!t.fired(100));
    }

    #[test]
    fn survives_tick_wraparound() {
        let mut t = EventTimer::new();
        t.arm(u32::MAX - 10, 100);
        assert!(!t.fired(u32::MAX));
        assert!(t.fired(89));
    }
}

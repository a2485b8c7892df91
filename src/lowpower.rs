//! Low-power cycle supervisor.
//!
//! Once per main-loop pass the session state machine asks the gate whether
//! the MCU may enter deep sleep. The gate answers "not yet" for a few passes
//! of hysteresis so a device servicing rapid-fire events does not churn
//! through sleep/wake transitions, then runs the sleep handler: peripheral
//! teardown, watchdog handling, deep sleep, and clock reconstruction on the
//! way back up.

use crate::hal::Board;

/// Loop passes between sleep decisions. A little idle power traded for a lot
/// less sleep/wake churn.
pub const SLEEP_LOOP_THRESHOLD: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Awake,
    AboutToSleep,
}

/// Counts main-loop passes and gates entry into deep sleep.
#[derive(Debug)]
pub struct LowPowerGate {
    looped: u8,
    threshold: u8,
    state: GateState,
}

impl Default for LowPowerGate {
    fn default() -> Self {
        Self::new(SLEEP_LOOP_THRESHOLD)
    }
}

impl LowPowerGate {
    pub fn new(threshold: u8) -> Self {
        Self { looped: 0, threshold, state: GateState::Awake }
    }

    /// One main-loop pass. Returns true when a sleep window was taken and
    /// the device is waking up, false when it stayed awake this pass.
    pub fn poll<B: Board>(&mut self, board: &mut B) -> bool {
        if self.looped < self.threshold {
            self.looped += 1;
            return false;
        }
        self.looped = 0;
        self.state = GateState::AboutToSleep;
        sleep_handler(board);
        self.state = GateState::Awake;
        true
    }

    pub fn loops_since_sleep(&self) -> u8 {
        self.looped
    }
}

/// Take the MCU through one deep-sleep window.
///
/// Skipped entirely when the wake came from an external host connection: a
/// host talking to the device must keep getting answers. Otherwise the pins
/// that would leak during sleep are tri-stated, the watchdog is parked
/// (deep sleep with the watchdog armed is undefined on this MCU class) and
/// restored to its prior state afterwards, and the software tick counter is
/// rebuilt from the always-on RTC since the main clock stopped.
fn sleep_handler<B: Board>(board: &mut B) {
    if board.woke_by_host() {
        trace!("host wake pending, skipping sleep window");
        return;
    }
    board.tristate_idle_pins();
    let watchdog_was_enabled = board.watchdog_enabled();
    if watchdog_was_enabled {
        board.watchdog_disable();
    }
    board.enter_deep_sleep();
    if watchdog_was_enabled {
        board.watchdog_enable();
    }
    board.sync_tick_to_rtc();
    board.restore_idle_pins();
    debug!("woke from deep sleep at {} ms", board.now_ms());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::Board;

    #[derive(Default)]
    struct FakeBoard {
        tick_ms: u32,
        rtc_ms: u32,
        host_wake: bool,
        wdt_enabled: bool,
        wdt_toggles: Vec<bool>,
        pins_tristated: bool,
        sleeps: u32,
        /// How far the RTC advances while the tick is stopped.
        sleep_elapsed_ms: u32,
    }

    impl Board for FakeBoard {
        fn now_ms(&self) -> u32 {
            self.tick_ms
        }
        fn rtc_ms(&self) -> u32 {
            self.rtc_ms
        }
        fn sync_tick_to_rtc(&mut self) {
            self.tick_ms = self.rtc_ms;
        }
        fn woke_by_host(&self) -> bool {
            self.host_wake
        }
        fn tristate_idle_pins(&mut self) {
            self.pins_tristated = true;
        }
        fn restore_idle_pins(&mut self) {
            assert!(self.pins_tristated);
            self.pins_tristated = false;
        }
        fn watchdog_enabled(&self) -> bool {
            self.wdt_enabled
        }
        fn watchdog_disable(&mut self) {
            self.wdt_enabled = false;
            self.wdt_toggles.push(false);
        }
        fn watchdog_enable(&mut self) {
            self.wdt_enabled = true;
            self.wdt_toggles.push(true);
        }
        fn enter_deep_sleep(&mut self) {
            assert!(!self.wdt_enabled, "deep sleep entered with watchdog armed");
            assert!(self.pins_tristated);
            self.sleeps += 1;
            // main clock stops; only the RTC advances
            self.rtc_ms += self.sleep_elapsed_ms;
        }
    }

    #[test]
    fn sleeps_exactly_on_fifth_qualifying_pass() {
        let mut gate = LowPowerGate::default();
        let mut board = FakeBoard::default();
        for _ in 0..5 {
            assert!(!gate.poll(&mut board));
        }
        assert_eq!(board.sleeps, 0);
        assert!(gate.poll(&mut board));
        assert_eq!(board.sleeps, 1);
        assert_eq!(gate.loops_since_sleep(), 0);
    }

    #[test]
    fn host_wake_skips_the_sleep_window() {
        let mut gate = LowPowerGate::new(0);
        let mut board = FakeBoard { host_wake: true, ..Default::default() };
        assert!(gate.poll(&mut board));
        assert_eq!(board.sleeps, 0);
        assert!(!board.pins_tristated);
    }

    #[test]
    fn watchdog_state_is_captured_and_restored() {
        let mut gate = LowPowerGate::new(0);
        let mut board = FakeBoard { wdt_enabled: true, ..Default::default() };
        gate.poll(&mut board);
        assert!(board.wdt_enabled);
        assert_eq!(board.wdt_toggles, vec![false, true]);

        let mut board = FakeBoard::default();
        gate.poll(&mut board);
        assert!(!board.wdt_enabled);
        assert!(board.wdt_toggles.is_empty());
    }

    #[test]
    fn clock_is_rebuilt_from_rtc_after_sleep() {
        let mut gate = LowPowerGate::new(0);
        let mut board = FakeBoard {
            tick_ms: 1_000,
            rtc_ms: 1_000,
            sleep_elapsed_ms: 14_000,
            ..Default::default()
        };
        let before = board.now_ms();
        gate.poll(&mut board);
        // monotonic and equal to pre-sleep time plus elapsed RTC ticks
        assert_eq!(board.now_ms(), before + 14_000);
        assert!(board.now_ms() >= before);
    }
}

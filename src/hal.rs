//! Board-level traits the control core is written against.
//!
//! Everything with a pin, a clock or a power domain behind it lives here so
//! the radio driver, the low-power supervisor and the session state machine
//! can be exercised on the host with mock implementations.

/// Pin-level access to the radio beyond the serial bus itself: the select
/// line, the busy line, the reset line and the wake-signal interrupt.
pub trait RadioIo {
    /// Drive the select line low, claiming the bus for one transaction.
    fn select_assert(&mut self);
    /// Release the select line.
    fn select_release(&mut self);
    /// Sample the busy line. High means the radio is mid-operation and must
    /// not be handed another transaction.
    fn busy_is_high(&mut self) -> bool;
    /// Drive the reset line low.
    fn reset_assert(&mut self);
    /// Release the reset line to its internal pull-up.
    fn reset_release(&mut self);
    /// Bind `handler` to the wake-signal line, rising edge, high priority.
    ///
    /// The handler runs in interrupt context; it must not perform bus
    /// transactions itself but defer protocol processing to the main loop.
    fn arm_dio_irq(&mut self, handler: fn());
}

/// MCU-level services the low-power supervisor needs: timekeeping, the
/// watchdog, pin leakage control around deep sleep, and deep sleep itself.
pub trait Board {
    /// Milliseconds from the software tick counter. Stops during deep sleep;
    /// [`Board::sync_tick_to_rtc`] reconstructs it afterwards.
    fn now_ms(&self) -> u32;
    /// Milliseconds from the always-on real-time clock.
    fn rtc_ms(&self) -> u32;
    /// Reload the software tick counter from the RTC after deep sleep.
    fn sync_tick_to_rtc(&mut self);
    /// Whether the last wake came from an external host connection rather
    /// than the RTC. A host-woken device must stay responsive and skip the
    /// next sleep window.
    fn woke_by_host(&self) -> bool;
    /// Tri-state the pins that would leak current during deep sleep (bus
    /// data line, transmit line).
    fn tristate_idle_pins(&mut self);
    /// Restore the pins tri-stated by [`Board::tristate_idle_pins`].
    fn restore_idle_pins(&mut self);
    fn watchdog_enabled(&self) -> bool;
    fn watchdog_disable(&mut self);
    fn watchdog_enable(&mut self);
    /// Enter the lowest deep-sleep power state. Returns on RTC alarm or
    /// external interrupt. Deep-sleep behaviour is undefined with the
    /// watchdog armed; callers disable it first.
    fn enter_deep_sleep(&mut self);
    /// Board identification.
    fn version(&self) -> BoardVersion {
        BoardVersion::default()
    }
}

/// Board version as four ordered fields. Packing into a register word is
/// explicit via [`BoardVersion::to_u32`]; no layout aliasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BoardVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub rfu: u8,
}

impl BoardVersion {
    pub fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self { major, minor, revision, rfu: 0 }
    }

    /// Register encoding: major in the top byte down to rfu in the bottom.
    pub fn to_u32(self) -> u32 {
        ((self.major as u32) << 24)
            | ((self.minor as u32) << 16)
            | ((self.revision as u32) << 8)
            | self.rfu as u32
    }
}

#[cfg(test)]
mod test {
    use super::BoardVersion;

    #[test]
    fn version_packs_fields_in_order() {
        let v = BoardVersion { major: 1, minor: 2, revision: 3, rfu: 4 };
        assert_eq!(v.to_u32(), 0x0102_0304);
        assert_eq!(BoardVersion::new(1, 0, 0).to_u32(), 0x0100_0000);
    }
}

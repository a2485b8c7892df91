//! Radio lifecycle controller: reset, wake, sleep and IRQ arming for the
//! transceiver, plus the command bus it is driven over.
//!
//! The MAC engine owns what gets sent; this module owns *when the chip is in
//! a state to accept it*. No bus transaction is issued unless the radio is
//! awake, and the wake/reset sequences respect the chip's mandatory timing
//! lower bounds.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiBus;

use crate::hal::RadioIo;

mod bus;
pub use bus::OpCode;

/// Reset line held low for at least this long.
pub const RESET_HOLD_MS: u32 = 20;
/// Reset line released to its pull-up for at least this long.
pub const RESET_RELEASE_MS: u32 = 20;
/// Additional settle time before the radio is considered ready.
pub const RESET_SETTLE_MS: u32 = 20;

/// Errors reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioError {
    /// Serial bus transfer failed.
    Spi,
    /// The busy line never deasserted within the spin bound. Software cannot
    /// tell a busy chip from a dead one; this is watchdog territory.
    BusyTimeout,
}

/// Lifecycle state of the transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioState {
    Asleep,
    Awake,
    Resetting,
}

/// Owns the serial bus, the control pins and the lifecycle state of the
/// radio.
pub struct Radio<SPI, IO, DLY> {
    spi: SPI,
    io: IO,
    delay: DLY,
    state: RadioState,
}

impl<SPI, IO, DLY> Radio<SPI, IO, DLY>
where
    SPI: SpiBus<u8>,
    IO: RadioIo,
    DLY: DelayNs,
{
    pub fn new(spi: SPI, io: IO, delay: DLY) -> Self {
        Self { spi, io, delay, state: RadioState::Asleep }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Board bring-up order: reset the chip, give it a moment, then park it
    /// in sleep until the MAC engine needs it.
    pub fn init(&mut self) -> Result<(), RadioError> {
        self.reset();
        self.delay.delay_ms(10);
        self.sleep()
    }

    /// Pulse the reset line. The three delays are mandatory lower bounds;
    /// shortening any of them yields an unresponsive device.
    pub fn reset(&mut self) {
        debug!("radio reset");
        self.state = RadioState::Resetting;
        self.io.reset_assert();
        self.delay.delay_ms(RESET_HOLD_MS);
        self.io.reset_release();
        self.delay.delay_ms(RESET_RELEASE_MS);
        self.delay.delay_ms(RESET_SETTLE_MS);
        self.state = RadioState::Awake;
    }

    /// Wake the radio with a status query and block until it reports ready.
    ///
    /// Runs with interrupts masked for its whole duration so a radio
    /// interrupt cannot race a half-awake device.
    pub fn wakeup(&mut self) -> Result<(), RadioError> {
        critical_section::with(|_| {
            self.io.select_assert();
            let res = self
                .exchange(OpCode::GetStatus.value())
                .and_then(|_| self.exchange(0x00));
            self.io.select_release();
            res?;
            self.wait_on_busy()
        })?;
        self.state = RadioState::Awake;
        trace!("radio awake");
        Ok(())
    }

    /// Put the radio into warm-start sleep. The sleep command is the one
    /// transaction that must not be followed by a busy-wait: the chip drives
    /// busy high for the whole sleep period.
    pub fn sleep(&mut self) -> Result<(), RadioError> {
        self.write_command(OpCode::SetSleep, &[bus::SLEEP_WARM_START])?;
        self.state = RadioState::Asleep;
        trace!("radio asleep");
        Ok(())
    }

    /// Bind `handler` to the wake-signal line, rising edge, high priority.
    pub fn arm_wake_interrupt(&mut self, handler: fn()) {
        self.io.arm_dio_irq(handler);
    }

    /// Wake the chip first if a transaction is about to be issued against a
    /// sleeping radio.
    fn ensure_ready(&mut self) -> Result<(), RadioError> {
        match self.state {
            RadioState::Awake => Ok(()),
            RadioState::Asleep | RadioState::Resetting => self.wakeup(),
        }
    }
}

#[cfg(test)]
mod test;

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorType, SpiBus};

use super::bus::BUSY_SPIN_LIMIT;
use super::{OpCode, Radio, RadioError, RadioState, RESET_HOLD_MS, RESET_RELEASE_MS};
use crate::hal::RadioIo;

/// Everything observable on the bus, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Select,
    Release,
    Byte(u8),
    BusyPoll,
    ResetLow,
    ResetHigh,
    DelayMs(u32),
}

type Log = Rc<RefCell<Vec<Op>>>;

struct FixtureSpi {
    log: Log,
    rx: u8,
}

impl ErrorType for FixtureSpi {
    type Error = core::convert::Infallible;
}

impl SpiBus<u8> for FixtureSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(self.rx);
        Ok(())
    }
    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &w in words {
            self.log.borrow_mut().push(Op::Byte(w));
        }
        Ok(())
    }
    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.write(write)?;
        self.read(read)
    }
    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for w in words.iter_mut() {
            self.log.borrow_mut().push(Op::Byte(*w));
            *w = self.rx;
        }
        Ok(())
    }
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct FixtureIo {
    log: Log,
    selected: bool,
    /// Busy polls answered high before the line clears. `u32::MAX` models a
    /// dead chip.
    busy_polls: u32,
}

impl RadioIo for FixtureIo {
    fn select_assert(&mut self) {
        assert!(!self.selected, "select asserted while a transaction is in flight");
        self.selected = true;
        self.log.borrow_mut().push(Op::Select);
    }
    fn select_release(&mut self) {
        assert!(self.selected);
        self.selected = false;
        self.log.borrow_mut().push(Op::Release);
    }
    fn busy_is_high(&mut self) -> bool {
        self.log.borrow_mut().push(Op::BusyPoll);
        if self.busy_polls == 0 {
            false
        } else {
            self.busy_polls = self.busy_polls.saturating_sub(1);
            true
        }
    }
    fn reset_assert(&mut self) {
        self.log.borrow_mut().push(Op::ResetLow);
    }
    fn reset_release(&mut self) {
        self.log.borrow_mut().push(Op::ResetHigh);
    }
    fn arm_dio_irq(&mut self, _handler: fn()) {}
}

struct FixtureDelay {
    log: Log,
}

impl DelayNs for FixtureDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.log.borrow_mut().push(Op::DelayMs(ns / 1_000_000));
    }
}

fn fixture(busy_polls: u32) -> (Radio<FixtureSpi, FixtureIo, FixtureDelay>, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let radio = Radio::new(
        FixtureSpi { log: log.clone(), rx: 0xA5 },
        FixtureIo { log: log.clone(), selected: false, busy_polls },
        FixtureDelay { log: log.clone() },
    );
    (radio, log)
}

fn awake(busy_polls: u32) -> (Radio<FixtureSpi, FixtureIo, FixtureDelay>, Log) {
    let (mut radio, log) = fixture(busy_polls);
    radio.reset();
    log.borrow_mut().clear();
    (radio, log)
}

#[test]
fn write_register_frames_address_big_endian() {
    let (mut radio, log) = awake(0);
    radio.write_registers(0x0740, &[0x34, 0x44]).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            Op::Select,
            Op::Byte(OpCode::WriteRegister.value()),
            Op::Byte(0x07),
            Op::Byte(0x40),
            Op::Byte(0x34),
            Op::Byte(0x44),
            Op::Release,
            Op::BusyPoll,
        ]
    );
}

#[test]
fn read_command_clocks_status_byte_then_payload() {
    let (mut radio, log) = awake(0);
    let mut status = [0u8; 2];
    radio.read_command(OpCode::GetIrqStatus, &mut status).unwrap();
    assert_eq!(status, [0xA5, 0xA5]);
    assert_eq!(
        *log.borrow(),
        vec![
            Op::Select,
            Op::Byte(OpCode::GetIrqStatus.value()),
            Op::Byte(0x00),
            Op::Byte(0x00),
            Op::Byte(0x00),
            Op::Release,
            Op::BusyPoll,
        ]
    );
}

#[test]
fn buffer_access_uses_single_byte_offset() {
    let (mut radio, log) = awake(0);
    radio.write_buffer(0x80, &[1, 2, 3]).unwrap();
    let ops = log.borrow().clone();
    assert_eq!(ops[1], Op::Byte(OpCode::WriteBuffer.value()));
    assert_eq!(ops[2], Op::Byte(0x80));
    assert_eq!(&ops[3..6], &[Op::Byte(1), Op::Byte(2), Op::Byte(3)]);
}

#[test]
fn sleep_command_skips_busy_handshake() {
    let (mut radio, log) = awake(0);
    radio.sleep().unwrap();
    assert_eq!(radio.state(), RadioState::Asleep);
    assert!(!log.borrow().contains(&Op::BusyPoll));
}

#[test]
fn every_other_command_waits_on_busy() {
    let (mut radio, log) = awake(3);
    radio.write_command(OpCode::SetStandby, &[0x00]).unwrap();
    let polls = log.borrow().iter().filter(|op| **op == Op::BusyPoll).count();
    // three highs plus the clearing poll
    assert_eq!(polls, 4);
    // busy handshake happens after the select window closes
    let release = log.borrow().iter().position(|op| *op == Op::Release).unwrap();
    let first_poll = log.borrow().iter().position(|op| *op == Op::BusyPoll).unwrap();
    assert!(first_poll > release);
}

#[test]
fn command_against_sleeping_radio_wakes_it_first() {
    let (mut radio, log) = awake(0);
    radio.sleep().unwrap();
    log.borrow_mut().clear();
    radio.write_command(OpCode::SetStandby, &[0x00]).unwrap();
    assert_eq!(radio.state(), RadioState::Awake);
    let ops = log.borrow().clone();
    // wake transaction: status query in its own select window
    assert_eq!(
        &ops[..4],
        &[Op::Select, Op::Byte(OpCode::GetStatus.value()), Op::Byte(0x00), Op::Release]
    );
    // then the actual command
    assert!(ops[5..].contains(&Op::Byte(OpCode::SetStandby.value())));
}

#[test]
fn select_windows_never_interleave() {
    let (mut radio, log) = awake(0);
    radio.write_registers(0x06C0, &[0xAA]).unwrap();
    radio.read_buffer(0x00, &mut [0u8; 4]).unwrap();
    let mut depth = 0i32;
    for op in log.borrow().iter() {
        match op {
            Op::Select => {
                depth += 1;
                assert_eq!(depth, 1, "nested select");
            }
            Op::Release => {
                depth -= 1;
                assert_eq!(depth, 0);
            }
            _ => {}
        }
    }
    assert_eq!(depth, 0);
}

#[test]
fn stuck_busy_line_is_fatal_after_bound() {
    let (mut radio, log) = awake(u32::MAX);
    let err = radio.write_command(OpCode::SetStandby, &[0x00]).unwrap_err();
    assert_eq!(err, RadioError::BusyTimeout);
    let polls = log.borrow().iter().filter(|op| **op == Op::BusyPoll).count();
    assert_eq!(polls as u32, BUSY_SPIN_LIMIT);
}

#[test]
fn reset_pulse_respects_mandatory_lower_bounds() {
    let (mut radio, log) = fixture(0);
    radio.reset();
    assert_eq!(radio.state(), RadioState::Awake);
    let ops = log.borrow().clone();
    let low = ops.iter().position(|op| *op == Op::ResetLow).unwrap();
    let high = ops.iter().position(|op| *op == Op::ResetHigh).unwrap();
    assert!(low < high);
    let hold: u32 = ops[low + 1..high]
        .iter()
        .map(|op| if let Op::DelayMs(ms) = op { *ms } else { 0 })
        .sum();
    let settle: u32 = ops[high + 1..]
        .iter()
        .map(|op| if let Op::DelayMs(ms) = op { *ms } else { 0 })
        .sum();
    assert!(hold >= RESET_HOLD_MS);
    assert!(settle >= RESET_RELEASE_MS);
}

//! Bus transaction engine: frames single-select command, register and buffer
//! transactions and enforces the busy-line handshake.
//!
//! Exactly one transaction is ever in flight: the select-assert through
//! busy-clear window runs inside `critical_section::with`, so an interrupt
//! handler can never interleave a second transaction on the same bus.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiBus;

use super::{Radio, RadioError};
use crate::hal::RadioIo;

/// Busy-wait bound. The busy window is sub-millisecond in normal operation;
/// exceeding this many polls means the chip is gone, not slow.
pub(crate) const BUSY_SPIN_LIMIT: u32 = 100_000;

/// Warm-start sleep configuration bit.
pub(crate) const SLEEP_WARM_START: u8 = 0x04;

/// Command opcodes understood by the transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(dead_code)]
#[allow(missing_docs)]
pub enum OpCode {
    GetStatus = 0xC0,
    WriteRegister = 0x0D,
    ReadRegister = 0x1D,
    WriteBuffer = 0x0E,
    ReadBuffer = 0x1E,
    SetSleep = 0x84,
    SetStandby = 0x80,
    SetTx = 0x83,
    SetRx = 0x82,
    CfgDioIrq = 0x08,
    GetIrqStatus = 0x12,
    ClrIrqStatus = 0x02,
}

impl OpCode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Payload phase of a transaction.
enum Transfer<'a> {
    Write(&'a [u8]),
    Read(&'a mut [u8]),
}

impl<SPI, IO, DLY> Radio<SPI, IO, DLY>
where
    SPI: SpiBus<u8>,
    IO: RadioIo,
    DLY: DelayNs,
{
    /// Issue a command with write-direction payload.
    pub fn write_command(&mut self, op: OpCode, data: &[u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        trace!("cmd {=u8:02x} write {} bytes", op.value(), data.len());
        // Sleep shuts the chip down; busy stays high until wakeup.
        let skip_busy = op == OpCode::SetSleep;
        self.execute(op, &[], Transfer::Write(data), skip_busy)
    }

    /// Issue a command and read its response. The chip shifts one status
    /// byte before the payload; it is clocked out and discarded here.
    pub fn read_command(&mut self, op: OpCode, data: &mut [u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        trace!("cmd {=u8:02x} read {} bytes", op.value(), data.len());
        self.execute(op, &[0x00], Transfer::Read(data), false)
    }

    /// Write `data` starting at the 16-bit register address (big-endian on
    /// the wire).
    pub fn write_registers(&mut self, address: u16, data: &[u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        let addr = address.to_be_bytes();
        self.execute(OpCode::WriteRegister, &addr, Transfer::Write(data), false)
    }

    pub fn write_register(&mut self, address: u16, value: u8) -> Result<(), RadioError> {
        self.write_registers(address, &[value])
    }

    /// Read registers starting at the 16-bit address. One NOP follows the
    /// address before data is clocked out.
    pub fn read_registers(&mut self, address: u16, data: &mut [u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        let addr = address.to_be_bytes();
        let header = [addr[0], addr[1], 0x00];
        self.execute(OpCode::ReadRegister, &header, Transfer::Read(data), false)
    }

    pub fn read_register(&mut self, address: u16) -> Result<u8, RadioError> {
        let mut value = [0u8];
        self.read_registers(address, &mut value)?;
        Ok(value[0])
    }

    /// Write into the packet buffer at an 8-bit offset.
    pub fn write_buffer(&mut self, offset: u8, data: &[u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        self.execute(OpCode::WriteBuffer, &[offset], Transfer::Write(data), false)
    }

    /// Read from the packet buffer at an 8-bit offset.
    pub fn read_buffer(&mut self, offset: u8, data: &mut [u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        self.execute(OpCode::ReadBuffer, &[offset, 0x00], Transfer::Read(data), false)
    }

    /// One framed transaction: select, opcode, header bytes, payload phase,
    /// deselect, then the busy handshake. Interrupts are masked for the
    /// whole window.
    fn execute(
        &mut self,
        op: OpCode,
        header: &[u8],
        transfer: Transfer,
        skip_busy: bool,
    ) -> Result<(), RadioError> {
        critical_section::with(|_| {
            self.io.select_assert();
            let res = self.shift(op.value(), header, transfer);
            self.io.select_release();
            res?;
            if skip_busy {
                Ok(())
            } else {
                self.wait_on_busy()
            }
        })
    }

    fn shift(&mut self, opcode: u8, header: &[u8], transfer: Transfer) -> Result<(), RadioError> {
        self.exchange(opcode)?;
        for &byte in header {
            self.exchange(byte)?;
        }
        match transfer {
            Transfer::Write(data) => {
                for &byte in data {
                    self.exchange(byte)?;
                }
            }
            Transfer::Read(data) => {
                for byte in data.iter_mut() {
                    *byte = self.exchange(0x00)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn exchange(&mut self, byte: u8) -> Result<u8, RadioError> {
        let mut word = [byte];
        self.spi.transfer_in_place(&mut word).map_err(|_| RadioError::Spi)?;
        Ok(word[0])
    }

    /// Bounded spin on the busy line. A line that never deasserts is a fatal
    /// hardware fault surfaced as [`RadioError::BusyTimeout`].
    pub(super) fn wait_on_busy(&mut self) -> Result<(), RadioError> {
        let mut spins: u32 = 0;
        while self.io.busy_is_high() {
            spins += 1;
            if spins >= BUSY_SPIN_LIMIT {
                warn!("busy line stuck after {} polls", spins);
                return Err(RadioError::BusyTimeout);
            }
        }
        Ok(())
    }
}

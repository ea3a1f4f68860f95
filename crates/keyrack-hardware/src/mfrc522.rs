//! Register-level driver for the NXP MFRC522 (RC522) reader.
//!
//! Only what the cabinet needs is implemented: soft reset and antenna setup,
//! the ISO 14443A REQA probe and cascade-level-1 anticollision, which yields
//! the first four UID bytes plus their block check character.
//!
//! SPI framing follows the datasheet (section 8.1.2): the address byte is
//! `(register << 1) & 0x7E`, with the top bit set for reads.

use tracing::trace;

use crate::error::{HardwareError, Result};
use crate::traits::{SpiTransport, TagReader};
use crate::types::ReaderInfo;

/// Chip registers used by the driver.
pub mod reg {
    pub const COMMAND: u8 = 0x01;
    pub const COM_IEN: u8 = 0x02;
    pub const COM_IRQ: u8 = 0x04;
    pub const ERROR: u8 = 0x06;
    pub const FIFO_DATA: u8 = 0x09;
    pub const FIFO_LEVEL: u8 = 0x0A;
    pub const CONTROL: u8 = 0x0C;
    pub const BIT_FRAMING: u8 = 0x0D;
    pub const MODE: u8 = 0x11;
    pub const TX_CONTROL: u8 = 0x14;
    pub const TX_ASK: u8 = 0x15;
    pub const T_MODE: u8 = 0x2A;
    pub const T_PRESCALER: u8 = 0x2B;
    pub const T_RELOAD_H: u8 = 0x2C;
    pub const T_RELOAD_L: u8 = 0x2D;
    pub const VERSION: u8 = 0x37;
}

/// Chip commands written to `CommandReg`.
pub mod cmd {
    pub const IDLE: u8 = 0x00;
    pub const TRANSCEIVE: u8 = 0x0C;
    pub const SOFT_RESET: u8 = 0x0F;
}

/// PICC commands sent over the air.
pub mod picc {
    pub const REQA: u8 = 0x26;
    pub const ANTICOLL_CL1: u8 = 0x93;
    pub const NVB_ANTICOLL: u8 = 0x20;
}

/// `ComIrqReg` bits.
pub mod irq {
    pub const SET1: u8 = 0x80;
    pub const RX: u8 = 0x20;
    pub const IDLE: u8 = 0x10;
    pub const TIMER: u8 = 0x01;
}

/// `BitFramingReg` start-send bit.
pub const START_SEND: u8 = 0x80;

/// `ErrorReg` bits that abort a transceive: BufferOvfl, Coll, Parity, Protocol.
const ERROR_MASK: u8 = 0x1B;

/// Polls of `ComIrqReg` before a transceive is abandoned.
const MAX_IRQ_POLLS: usize = 2000;

/// The chip FIFO holds 64 bytes.
const FIFO_SIZE: usize = 64;

/// Address byte for an SPI register access.
#[must_use]
pub fn address(register: u8, read: bool) -> u8 {
    let addr = (register << 1) & 0x7E;
    if read { addr | 0x80 } else { addr }
}

/// Bytes and valid bits returned by a transceive.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Response {
    data: Vec<u8>,
    bits: usize,
}

/// MFRC522 driver over any [`SpiTransport`].
///
/// The driver does not select the chip; the bus arbiter drives the select
/// line before any method is called. Because each reader is reset on every
/// probe, one driver instance serves the whole bank.
#[derive(Debug)]
pub struct Mfrc522<T> {
    spi: T,
    bus_speed_hz: Option<u32>,
}

impl<T: SpiTransport> Mfrc522<T> {
    pub fn new(spi: T) -> Self {
        Self {
            spi,
            bus_speed_hz: None,
        }
    }

    /// Record the bus clock reported by [`TagReader::reader_info`].
    pub fn with_bus_speed_hz(mut self, hz: u32) -> Self {
        self.bus_speed_hz = Some(hz);
        self
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        let tx = [address(register, false), value];
        let mut rx = [0u8; 2];
        self.spi.transfer(&tx, &mut rx)
    }

    fn read_register(&mut self, register: u8) -> Result<u8> {
        let tx = [address(register, true), 0x00];
        let mut rx = [0u8; 2];
        self.spi.transfer(&tx, &mut rx)?;
        Ok(rx[1])
    }

    fn set_bits(&mut self, register: u8, mask: u8) -> Result<()> {
        let value = self.read_register(register)?;
        self.write_register(register, value | mask)
    }

    fn clear_bits(&mut self, register: u8, mask: u8) -> Result<()> {
        let value = self.read_register(register)?;
        self.write_register(register, value & !mask)
    }

    /// Silicon version byte (0x91 or 0x92 for genuine parts).
    ///
    /// # Errors
    ///
    /// Returns a communication error if the transfer fails.
    pub fn version(&mut self) -> Result<u8> {
        self.read_register(reg::VERSION)
    }

    /// Soft-reset the selected chip and switch its antenna on.
    ///
    /// # Errors
    ///
    /// Returns a communication error if any register access fails.
    pub fn init(&mut self) -> Result<()> {
        self.write_register(reg::COMMAND, cmd::SOFT_RESET)?;
        // Timer: TAuto, prescaler 0x0D3E (~40 kHz), reload 30 => ~25 ms timeout.
        self.write_register(reg::T_MODE, 0x8D)?;
        self.write_register(reg::T_PRESCALER, 0x3E)?;
        self.write_register(reg::T_RELOAD_L, 30)?;
        self.write_register(reg::T_RELOAD_H, 0)?;
        // 100% ASK, CRC preset 0x6363.
        self.write_register(reg::TX_ASK, 0x40)?;
        self.write_register(reg::MODE, 0x3D)?;

        let tx_control = self.read_register(reg::TX_CONTROL)?;
        if tx_control & 0x03 != 0x03 {
            self.set_bits(reg::TX_CONTROL, 0x03)?;
        }
        Ok(())
    }

    fn transceive(&mut self, data: &[u8], bit_framing: u8) -> Result<Response> {
        self.write_register(reg::COM_IEN, 0x77 | irq::SET1)?;
        // Set1 cleared: every bit written as 1 is cleared.
        self.write_register(reg::COM_IRQ, 0x7F)?;
        self.write_register(reg::COMMAND, cmd::IDLE)?;
        self.write_register(reg::FIFO_LEVEL, 0x80)?;
        for &byte in data {
            self.write_register(reg::FIFO_DATA, byte)?;
        }
        self.write_register(reg::BIT_FRAMING, bit_framing)?;
        self.write_register(reg::COMMAND, cmd::TRANSCEIVE)?;
        self.set_bits(reg::BIT_FRAMING, START_SEND)?;

        let mut status = None;
        for _ in 0..MAX_IRQ_POLLS {
            let flags = self.read_register(reg::COM_IRQ)?;
            if flags & (irq::RX | irq::IDLE | irq::TIMER) != 0 {
                status = Some(flags);
                break;
            }
        }
        self.clear_bits(reg::BIT_FRAMING, START_SEND)?;

        let flags = status.ok_or_else(|| HardwareError::communication("transceive timed out"))?;
        let error = self.read_register(reg::ERROR)?;
        if error & ERROR_MASK != 0 {
            return Err(HardwareError::communication(format!(
                "reader error register {error:#04x}"
            )));
        }
        if flags & irq::TIMER != 0 && flags & irq::RX == 0 {
            return Err(HardwareError::NoCard);
        }

        let level = usize::from(self.read_register(reg::FIFO_LEVEL)?).min(FIFO_SIZE);
        let last_bits = usize::from(self.read_register(reg::CONTROL)? & 0x07);
        let bits = match (level, last_bits) {
            (0, _) => 0,
            (n, 0) => n * 8,
            (n, last) => (n - 1) * 8 + last,
        };

        let mut response = Vec::with_capacity(level);
        for _ in 0..level {
            response.push(self.read_register(reg::FIFO_DATA)?);
        }
        trace!(sent = data.len(), received = response.len(), bits, "transceive");
        Ok(Response {
            data: response,
            bits,
        })
    }

    /// Send REQA; `true` when a tag answers with a 16-bit ATQA.
    fn request(&mut self) -> Result<bool> {
        match self.transceive(&[picc::REQA], 0x07) {
            Ok(response) => Ok(response.bits == 16),
            Err(HardwareError::NoCard) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Cascade level 1 anticollision: four UID bytes checked against BCC.
    fn anticollision(&mut self) -> Result<Vec<u8>> {
        let response = self.transceive(&[picc::ANTICOLL_CL1, picc::NVB_ANTICOLL], 0x00)?;
        let [a, b, c, d, bcc] = response.data[..] else {
            return Err(HardwareError::communication(format!(
                "anticollision returned {} bytes",
                response.data.len()
            )));
        };
        let expected = a ^ b ^ c ^ d;
        if expected != bcc {
            return Err(HardwareError::ChecksumMismatch {
                expected,
                actual: bcc,
            });
        }
        Ok(vec![a, b, c, d])
    }
}

impl<T: SpiTransport> TagReader for Mfrc522<T> {
    fn is_card_present(&mut self) -> Result<bool> {
        self.init()?;
        self.request()
    }

    fn read_uid(&mut self) -> Result<Vec<u8>> {
        self.anticollision()
    }

    fn reader_info(&self) -> ReaderInfo {
        let info = ReaderInfo::new("MFRC522", vec!["ISO14443A".to_string()]);
        match self.bus_speed_hz {
            Some(hz) => info.with_bus_speed_hz(hz),
            None => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transport that records every frame and answers reads from a script.
    #[derive(Default)]
    struct ScriptedSpi {
        frames: Vec<Vec<u8>>,
        reads: VecDeque<u8>,
    }

    impl SpiTransport for ScriptedSpi {
        fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
            self.frames.push(tx.to_vec());
            if tx[0] & 0x80 != 0 {
                rx[1] = self.reads.pop_front().unwrap_or(0);
            }
            Ok(())
        }
    }

    #[test]
    fn test_address_byte() {
        assert_eq!(address(reg::COMMAND, false), 0x02);
        assert_eq!(address(reg::COMMAND, true), 0x82);
        assert_eq!(address(reg::VERSION, true), 0xEE);
        assert_eq!(address(reg::FIFO_DATA, false), 0x12);
    }

    #[test]
    fn test_write_register_frame() {
        let mut driver = Mfrc522::new(ScriptedSpi::default());
        driver.write_register(reg::T_MODE, 0x8D).unwrap();
        assert_eq!(driver.spi.frames, vec![vec![0x54, 0x8D]]);
    }

    #[test]
    fn test_version_read() {
        let spi = ScriptedSpi {
            reads: VecDeque::from([0x92]),
            ..Default::default()
        };
        let mut driver = Mfrc522::new(spi);
        assert_eq!(driver.version().unwrap(), 0x92);
        assert_eq!(driver.spi.frames, vec![vec![0xEE, 0x00]]);
    }

    #[test]
    fn test_init_turns_antenna_on() {
        let spi = ScriptedSpi {
            // TxControl read, then read-modify-write read.
            reads: VecDeque::from([0x80, 0x80]),
            ..Default::default()
        };
        let mut driver = Mfrc522::new(spi);
        driver.init().unwrap();
        assert_eq!(driver.spi.frames[0], vec![0x02, cmd::SOFT_RESET]);
        assert_eq!(
            driver.spi.frames.last().unwrap(),
            &vec![address(reg::TX_CONTROL, false), 0x83]
        );
    }

    #[test]
    fn test_reader_info() {
        let driver = Mfrc522::new(ScriptedSpi::default()).with_bus_speed_hz(1_000_000);
        let info = driver.reader_info();
        assert_eq!(info.name, "MFRC522");
        assert_eq!(info.bus_speed_hz, Some(1_000_000));
    }
}

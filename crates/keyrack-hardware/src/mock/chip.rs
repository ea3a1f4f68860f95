//! Simulated MFRC522 bank.
//!
//! Emulates enough of the chip's register file and FIFO for the real
//! [`Mfrc522`](crate::mfrc522::Mfrc522) driver to run unchanged, answering
//! REQA and anticollision from the [`MockCabinet`] field of whichever reader
//! is selected.

use std::collections::VecDeque;

use super::MockCabinet;
use crate::error::{HardwareError, Result};
use crate::mfrc522::{START_SEND, cmd, irq, picc, reg};
use crate::traits::SpiTransport;

const REGISTER_COUNT: usize = 0x40;
const VERSION_2_0: u8 = 0x92;
const ATQA_MIFARE_1K: [u8; 2] = [0x04, 0x00];

/// SPI transport backed by simulated chips.
///
/// All readers share one register file: only the selected reader is
/// addressed, and the driver resets it before every probe.
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    cabinet: MockCabinet,
    registers: [u8; REGISTER_COUNT],
    fifo: VecDeque<u8>,
}

impl SimulatedChip {
    pub fn new(cabinet: MockCabinet) -> Self {
        let mut chip = Self {
            cabinet,
            registers: [0; REGISTER_COUNT],
            fifo: VecDeque::new(),
        };
        chip.reset();
        chip
    }

    fn reset(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.registers[usize::from(reg::VERSION)] = VERSION_2_0;
        self.fifo.clear();
    }

    fn read(&mut self, register: u8) -> u8 {
        match register {
            reg::FIFO_DATA => self.fifo.pop_front().unwrap_or(0),
            reg::FIFO_LEVEL => u8::try_from(self.fifo.len()).unwrap_or(u8::MAX),
            _ => self.registers[usize::from(register) % REGISTER_COUNT],
        }
    }

    fn write(&mut self, register: u8, value: u8) -> Result<()> {
        match register {
            reg::COMMAND => match value & 0x0F {
                cmd::SOFT_RESET => self.reset(),
                command => self.registers[usize::from(reg::COMMAND)] = command,
            },
            reg::COM_IRQ => {
                let slot = &mut self.registers[usize::from(reg::COM_IRQ)];
                if value & irq::SET1 != 0 {
                    *slot |= value & 0x7F;
                } else {
                    *slot &= !value;
                }
            }
            reg::FIFO_DATA => self.fifo.push_back(value),
            reg::FIFO_LEVEL => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            reg::BIT_FRAMING => {
                self.registers[usize::from(reg::BIT_FRAMING)] = value;
                let transceiving = self.registers[usize::from(reg::COMMAND)] == cmd::TRANSCEIVE;
                if value & START_SEND != 0 && transceiving {
                    self.exchange(value & 0x07)?;
                }
            }
            _ => self.registers[usize::from(register) % REGISTER_COUNT] = value,
        }
        Ok(())
    }

    /// Run one air exchange with the frame currently in the FIFO.
    fn exchange(&mut self, tx_last_bits: u8) -> Result<()> {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        let field = self.cabinet.field()?;

        let response: Option<Vec<u8>> = match (frame.as_slice(), tx_last_bits, field) {
            ([picc::REQA], 7, Some(_)) => Some(ATQA_MIFARE_1K.to_vec()),
            ([picc::ANTICOLL_CL1, picc::NVB_ANTICOLL], 0, Some(uid)) => {
                let bcc = uid.iter().fold(0u8, |acc, b| acc ^ b);
                let mut bytes = uid.to_vec();
                bytes.push(bcc);
                Some(bytes)
            }
            _ => None,
        };

        self.registers[usize::from(reg::ERROR)] = 0;
        self.registers[usize::from(reg::CONTROL)] = 0;
        let com_irq = usize::from(reg::COM_IRQ);
        match response {
            Some(bytes) => {
                self.fifo.extend(bytes);
                self.registers[com_irq] |= irq::RX | irq::IDLE;
            }
            None => self.registers[com_irq] |= irq::TIMER,
        }
        Ok(())
    }
}

impl SpiTransport for SimulatedChip {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(HardwareError::communication("transfer buffers differ in length"));
        }
        let Some((&address, payload)) = tx.split_first() else {
            return Ok(());
        };

        let register = (address & 0x7E) >> 1;
        rx[0] = 0;
        if address & 0x80 != 0 {
            for slot in rx.iter_mut().skip(1) {
                *slot = self.read(register);
            }
        } else {
            for &value in payload {
                self.write(register, value)?;
            }
        }
        Ok(())
    }
}

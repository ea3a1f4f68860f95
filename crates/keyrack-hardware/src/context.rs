//! Explicitly constructed hardware context.
//!
//! Holds the driver mode, the slot map, the bus arbiter and the relay
//! controller. Built once at startup and shared by `Arc` between the
//! background loop and verification tasks.

use std::sync::Arc;

use keyrack_core::{CabinetConfig, DriverMode, SlotConfig, SlotNumber};
use tracing::info;

use crate::bus::BusArbiter;
use crate::devices::{AnyPinControl, AnySpiTransport, AnyTagReader};
use crate::error::Result;
use crate::mfrc522::Mfrc522;
use crate::mock::{MockCabinet, MockPins, MockTagReader, SimulatedChip};
use crate::relay::RelayController;
use crate::traits::TagReader;

/// Everything the coordinator needs to reach the cabinet.
#[derive(Debug, Clone)]
pub struct HardwareContext {
    mode: DriverMode,
    slots: Vec<SlotConfig>,
    bus: Arc<BusArbiter>,
    relays: Arc<RelayController>,
}

impl HardwareContext {
    fn assemble(
        mode: DriverMode,
        slots: &[SlotConfig],
        pins: AnyPinControl,
        reader: AnyTagReader,
    ) -> Self {
        info!(
            %mode,
            reader = %reader.reader_info().name,
            slots = slots.len(),
            "hardware context ready"
        );
        let pins = Arc::new(pins);
        Self {
            mode,
            slots: slots.to_vec(),
            bus: Arc::new(BusArbiter::new(slots, Arc::clone(&pins), reader)),
            relays: Arc::new(RelayController::new(slots, pins)),
        }
    }

    /// Context driving the real cabinet: `pinctrl` for GPIO, MFRC522 readers
    /// over spidev.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if the SPI device cannot
    /// be opened, or `HardwareError::Configuration` when the crate was built
    /// without the `hardware-spi` feature.
    #[cfg(feature = "hardware-spi")]
    pub fn real(config: &CabinetConfig) -> Result<Self> {
        let hardware = &config.hardware;
        let spi = crate::spi::SpidevTransport::open(&hardware.spi_device, hardware.spi_speed_hz)?;
        let reader =
            Mfrc522::new(AnySpiTransport::Spidev(spi)).with_bus_speed_hz(hardware.spi_speed_hz);
        let pins = crate::pins::PinctrlPins::new(hardware.pin_tool.clone());
        Ok(Self::assemble(
            DriverMode::Real,
            &config.slots,
            AnyPinControl::Pinctrl(pins),
            AnyTagReader::Mfrc522(reader),
        ))
    }

    /// Context driving the real cabinet.
    ///
    /// # Errors
    ///
    /// Always `HardwareError::Configuration`: this build has no SPI support.
    #[cfg(not(feature = "hardware-spi"))]
    pub fn real(_config: &CabinetConfig) -> Result<Self> {
        Err(crate::HardwareError::configuration(
            "built without the hardware-spi feature",
        ))
    }

    /// Context backed by the mock cabinet; the returned handle scripts and
    /// inspects it.
    pub fn mock(config: &CabinetConfig) -> (Self, MockCabinet) {
        let cabinet = MockCabinet::new(&config.slots, &config.mock);
        let context = Self::assemble(
            DriverMode::Mock,
            &config.slots,
            AnyPinControl::Mock(MockPins::new(cabinet.clone())),
            AnyTagReader::Mock(MockTagReader::new(cabinet.clone())),
        );
        (context, cabinet)
    }

    /// Mock cabinet read through the real MFRC522 driver over simulated
    /// chips.
    pub fn simulated(config: &CabinetConfig) -> (Self, MockCabinet) {
        let cabinet = MockCabinet::new(&config.slots, &config.mock);
        let chip = AnySpiTransport::Simulated(SimulatedChip::new(cabinet.clone()));
        let context = Self::assemble(
            DriverMode::Mock,
            &config.slots,
            AnyPinControl::Mock(MockPins::new(cabinet.clone())),
            AnyTagReader::Mfrc522(Mfrc522::new(chip)),
        );
        (context, cabinet)
    }

    /// Drive every line to its safe level: readers deselected, relays locked.
    ///
    /// # Errors
    ///
    /// Returns the first pin write failure.
    pub fn initialize(&self) -> Result<()> {
        self.bus.initialize()?;
        self.relays.initialize()?;
        info!(mode = %self.mode, "all select lines inactive, all relays locked");
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> DriverMode {
        self.mode
    }

    #[must_use]
    pub fn slots(&self) -> &[SlotConfig] {
        &self.slots
    }

    /// Configured slot numbers, ascending.
    #[must_use]
    pub fn slot_numbers(&self) -> Vec<SlotNumber> {
        let mut numbers: Vec<_> = self.slots.iter().map(|slot| slot.number).collect();
        numbers.sort();
        numbers
    }

    #[must_use]
    pub fn contains(&self, slot: SlotNumber) -> bool {
        self.slots.iter().any(|s| s.number == slot)
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<BusArbiter> {
        &self.bus
    }

    #[must_use]
    pub fn relays(&self) -> &Arc<RelayController> {
        &self.relays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_once;
    use keyrack_core::{Level, MockConfig};

    fn quiet_config() -> CabinetConfig {
        CabinetConfig {
            mock: MockConfig::quiet(),
            ..CabinetConfig::default()
        }
    }

    #[test]
    fn test_mock_context_initializes_safe_levels() {
        let (context, cabinet) = HardwareContext::mock(&quiet_config());
        context.initialize().unwrap();

        assert_eq!(context.mode(), DriverMode::Mock);
        assert_eq!(context.slot_numbers().len(), 10);
        for slot in context.slot_numbers() {
            assert_eq!(cabinet.relay_level(slot), Some(Level::Low));
        }
        assert!(cabinet.selected().is_empty());
    }

    #[test]
    fn test_mock_and_simulated_read_the_same_badge() {
        let slot = SlotNumber::new(4).unwrap();
        for (context, cabinet) in [
            HardwareContext::mock(&quiet_config()),
            HardwareContext::simulated(&quiet_config()),
        ] {
            context.initialize().unwrap();
            cabinet.present_badge(slot, [0x11, 0x22, 0x33, 0x44]);

            let mut access = context.bus().activate(slot).unwrap();
            let uid = scan_once(&mut access);
            drop(access);

            assert_eq!(uid.map(|u| u.to_string()), Some("11223344".to_string()));
            assert_eq!(cabinet.max_selected(), 1);
        }
    }

    #[cfg(not(feature = "hardware-spi"))]
    #[test]
    fn test_real_requires_feature() {
        assert!(HardwareContext::real(&CabinetConfig::default()).is_err());
    }
}

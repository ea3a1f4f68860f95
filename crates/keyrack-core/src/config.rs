//! Cabinet configuration.
//!
//! One validated [`CabinetConfig`] is shared by every driver, so the slot map
//! (which reader select line and which relay line belong to which slot) is
//! defined exactly once. Every field has a default; a missing file yields the
//! stock ten-slot cabinet.
//!
//! ```
//! use keyrack_core::CabinetConfig;
//!
//! let config = CabinetConfig::from_toml_str(r#"
//!     [timing]
//!     verification_timeout_ms = 5000
//!
//!     [[slots]]
//!     number = 1
//!     chip_select = 4
//!     relay = 17
//! "#).unwrap();
//!
//! assert_eq!(config.slots.len(), 1);
//! assert_eq!(config.timing.verification_timeout().as_secs(), 5);
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKGROUND_INTERVAL_MS, DEFAULT_BADGE_PROBABILITY, DEFAULT_CHIP_SELECT_PINS,
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MOCK_SEED, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_PIN_TOOL,
    DEFAULT_PULL_AFTER_READS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_RELAY_PINS,
    DEFAULT_SERVER_ADDR, DEFAULT_SPI_DEVICE, DEFAULT_SPI_SPEED_HZ,
    DEFAULT_VERIFICATION_INTERVAL_MS, DEFAULT_VERIFICATION_TIMEOUT_MS,
};
use crate::error::{Error, Result};
use crate::types::{PinLine, SlotNumber};

/// One cabinet slot and the two lines wired to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub number: SlotNumber,
    pub chip_select: PinLine,
    pub relay: PinLine,
}

/// Loop periods and the verification window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub background_interval_ms: u64,
    pub verification_interval_ms: u64,
    pub verification_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            background_interval_ms: DEFAULT_BACKGROUND_INTERVAL_MS,
            verification_interval_ms: DEFAULT_VERIFICATION_INTERVAL_MS,
            verification_timeout_ms: DEFAULT_VERIFICATION_TIMEOUT_MS,
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub fn background_interval(&self) -> Duration {
        Duration::from_millis(self.background_interval_ms)
    }

    #[must_use]
    pub fn verification_interval(&self) -> Duration {
        Duration::from_millis(self.verification_interval_ms)
    }

    #[must_use]
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    /// Check that every period is positive and the window covers at least
    /// one verification tick.
    ///
    /// # Errors
    ///
    /// `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("background_interval_ms", self.background_interval_ms),
            ("verification_interval_ms", self.verification_interval_ms),
            ("verification_timeout_ms", self.verification_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.verification_timeout_ms < self.verification_interval_ms {
            return Err(Error::Config(format!(
                "verification_timeout_ms ({}) is shorter than verification_interval_ms ({})",
                self.verification_timeout_ms, self.verification_interval_ms
            )));
        }
        Ok(())
    }
}

/// Real hardware access settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Skip detection and always run the mock cabinet.
    pub force_mock: bool,

    /// Pin-control utility looked up on `PATH`.
    pub pin_tool: String,

    /// SPI device node the readers share.
    pub spi_device: PathBuf,

    pub spi_speed_hz: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            force_mock: false,
            pin_tool: DEFAULT_PIN_TOOL.to_string(),
            spi_device: PathBuf::from(DEFAULT_SPI_DEVICE),
            spi_speed_hz: DEFAULT_SPI_SPEED_HZ,
        }
    }
}

/// Behaviour of the simulated cabinet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Chance per background read that an idle slot sees a random badge.
    pub badge_probability: f64,

    /// Selections during a verification window before the key is gone.
    /// `0` keeps the key in place forever.
    pub pull_after_reads: u32,

    pub seed: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            badge_probability: DEFAULT_BADGE_PROBABILITY,
            pull_after_reads: DEFAULT_PULL_AFTER_READS,
            seed: DEFAULT_MOCK_SEED,
        }
    }
}

impl MockConfig {
    /// Selections before the simulated user pulls the key, if ever.
    #[must_use]
    pub fn pull_after(&self) -> Option<u32> {
        (self.pull_after_reads > 0).then_some(self.pull_after_reads)
    }

    /// A quiet cabinet: no random badges and keys that are never pulled.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            badge_probability: 0.0,
            pull_after_reads: 0,
            ..Default::default()
        }
    }
}

/// Connection to the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub server_addr: String,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub outbound_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Complete cabinet configuration, as read from `keyrack.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinetConfig {
    #[serde(default = "default_slots")]
    pub slots: Vec<SlotConfig>,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub hardware: HardwareConfig,

    #[serde(default)]
    pub mock: MockConfig,

    #[serde(default)]
    pub channel: ChannelConfig,
}

/// The stock ten-slot wiring.
fn default_slots() -> Vec<SlotConfig> {
    DEFAULT_CHIP_SELECT_PINS
        .iter()
        .zip(DEFAULT_RELAY_PINS.iter())
        .enumerate()
        .filter_map(|(index, (&cs, &relay))| {
            let number = u8::try_from(index + 1).ok()?;
            Some(SlotConfig {
                number: SlotNumber::new(number).ok()?,
                chip_select: PinLine::new(cs).ok()?,
                relay: PinLine::new(relay).ok()?,
            })
        })
        .collect()
}

impl Default for CabinetConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            timing: TimingConfig::default(),
            hardware: HardwareConfig::default(),
            mock: MockConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

impl CabinetConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` for malformed TOML and any validation
    /// error from [`CabinetConfig::validate`].
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CabinetConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, otherwise as
    /// [`CabinetConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` if given, otherwise the validated defaults.
    ///
    /// # Errors
    /// As [`CabinetConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Look up a configured slot.
    #[must_use]
    pub fn slot(&self, number: SlotNumber) -> Option<&SlotConfig> {
        self.slots.iter().find(|slot| slot.number == number)
    }

    /// Check the configuration for wiring and timing mistakes.
    ///
    /// # Errors
    /// - `Error::Config` for an empty slot list, zero intervals, a timeout
    ///   shorter than the verification tick, a probability outside `[0, 1]`
    ///   or a zero queue capacity
    /// - `Error::DuplicateSlot` when a slot number appears twice
    /// - `Error::PinCollision` when one physical line is wired twice
    pub fn validate(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(Error::Config("at least one slot must be configured".into()));
        }

        let mut numbers = HashSet::new();
        let mut owners: HashMap<PinLine, String> = HashMap::new();
        for slot in &self.slots {
            if !numbers.insert(slot.number) {
                return Err(Error::DuplicateSlot(slot.number.as_u8()));
            }
            for (pin, role) in [(slot.chip_select, "chip-select"), (slot.relay, "relay")] {
                let label = format!("{role} of slot {}", slot.number);
                if let Some(first) = owners.get(&pin) {
                    return Err(Error::PinCollision {
                        pin: pin.as_u8(),
                        first: first.clone(),
                        second: label,
                    });
                }
                owners.insert(pin, label);
            }
        }

        self.timing.validate()?;
        for (name, value) in [
            ("reconnect_delay_ms", self.channel.reconnect_delay_ms),
            ("connect_timeout_ms", self.channel.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }

        if !(0.0..=1.0).contains(&self.mock.badge_probability) {
            return Err(Error::Config(format!(
                "badge_probability must be within [0, 1], got {}",
                self.mock.badge_probability
            )));
        }

        if self.channel.outbound_capacity == 0 {
            return Err(Error::Config("outbound_capacity must be greater than zero".into()));
        }
        if self.channel.server_addr.trim().is_empty() {
            return Err(Error::Config("server_addr cannot be empty".into()));
        }

        Ok(())
    }

    /// Settings that are legal but probably unintended.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.timing.verification_interval_ms < self.timing.background_interval_ms {
            warnings.push(format!(
                "verification tick ({} ms) is faster than the background tick ({} ms)",
                self.timing.verification_interval_ms, self.timing.background_interval_ms
            ));
        }
        warnings
    }
}

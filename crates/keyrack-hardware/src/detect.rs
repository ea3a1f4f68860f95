//! Startup hardware capability detection.
//!
//! Two probes decide whether the cabinet is driven for real: the pin-control
//! utility must be on `PATH`, and the reader driver must be usable (built with
//! the `hardware-spi` feature and the SPI node present). Anything missing
//! falls back to the mock cabinet; detection itself never fails.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use keyrack_core::{DriverMode, HardwareConfig};
use tracing::{info, warn};

/// Outcome of the startup probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Resolved path of the pin-control utility.
    pub pin_tool: Option<PathBuf>,
    /// Whether the reader driver can reach the SPI bus.
    pub reader_driver: bool,
    /// Mock mode was requested in configuration.
    pub forced_mock: bool,
}

impl Detection {
    /// Driver family selected by the probes.
    #[must_use]
    pub fn mode(&self) -> DriverMode {
        if !self.forced_mock && self.pin_tool.is_some() && self.reader_driver {
            DriverMode::Real
        } else {
            DriverMode::Mock
        }
    }
}

/// Run the probes and log the selected mode.
pub fn detect(config: &HardwareConfig) -> Detection {
    let detection = probe(config, std::env::var_os("PATH").as_deref());
    report(config, &detection);
    detection
}

fn probe(config: &HardwareConfig, path_var: Option<&OsStr>) -> Detection {
    Detection {
        pin_tool: find_executable(&config.pin_tool, path_var),
        reader_driver: reader_driver_available(&config.spi_device),
        forced_mock: config.force_mock,
    }
}

fn report(config: &HardwareConfig, detection: &Detection) {
    let mode = detection.mode();
    if detection.forced_mock {
        info!(%mode, "mock mode forced by configuration");
        return;
    }
    match &detection.pin_tool {
        Some(path) => info!(tool = %path.display(), "pin control available"),
        None => warn!(tool = %config.pin_tool, "pin-control utility not found"),
    }
    if detection.reader_driver {
        info!(device = %config.spi_device.display(), "reader driver available");
    } else if cfg!(feature = "hardware-spi") {
        warn!(device = %config.spi_device.display(), "SPI device not found");
    } else {
        warn!("built without the hardware-spi feature");
    }
    info!(%mode, "driver mode selected");
}

/// Resolve `tool` the way a shell would: paths are checked directly, bare
/// names are looked up in each `PATH` entry.
fn find_executable(tool: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(tool);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    std::env::split_paths(path_var?)
        .map(|dir| dir.join(tool))
        .find(|path| path.is_file())
}

fn reader_driver_available(device: &Path) -> bool {
    cfg!(feature = "hardware-spi") && device.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn path_with(dir: &Path) -> OsString {
        std::env::join_paths([PathBuf::from("/nonexistent"), dir.to_path_buf()]).unwrap()
    }

    #[test]
    fn test_finds_tool_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("pinctrl");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        let path_var = path_with(dir.path());
        assert_eq!(find_executable("pinctrl", Some(&path_var)), Some(tool));
        assert_eq!(find_executable("gpioset", Some(&path_var)), None);
        assert_eq!(find_executable("pinctrl", None), None);
    }

    #[test]
    fn test_absolute_tool_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("pinctrl");
        std::fs::write(&tool, "").unwrap();
        let tool_str = tool.to_str().unwrap();
        assert_eq!(find_executable(tool_str, None), Some(tool.clone()));
    }

    #[test]
    fn test_missing_tool_selects_mock() {
        let config = HardwareConfig {
            pin_tool: "keyrack-no-such-tool".to_string(),
            ..HardwareConfig::default()
        };
        let detection = probe(&config, Some(OsStr::new("/nonexistent")));
        assert_eq!(detection.pin_tool, None);
        assert_eq!(detection.mode(), DriverMode::Mock);
    }

    #[test]
    fn test_missing_spi_device_selects_mock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pinctrl"), "").unwrap();
        let config = HardwareConfig {
            spi_device: dir.path().join("spidev9.9"),
            ..HardwareConfig::default()
        };
        let path_var = path_with(dir.path());
        let detection = probe(&config, Some(&path_var));
        assert!(detection.pin_tool.is_some());
        assert!(!detection.reader_driver);
        assert_eq!(detection.mode(), DriverMode::Mock);
    }

    #[test]
    fn test_mode_table() {
        let real = Detection {
            pin_tool: Some(PathBuf::from("/usr/bin/pinctrl")),
            reader_driver: true,
            forced_mock: false,
        };
        assert_eq!(real.mode(), DriverMode::Real);

        let forced = Detection {
            forced_mock: true,
            ..real.clone()
        };
        assert_eq!(forced.mode(), DriverMode::Mock);

        let no_reader = Detection {
            reader_driver: false,
            ..real
        };
        assert_eq!(no_reader.mode(), DriverMode::Mock);
    }

    #[test]
    fn test_detect_never_fails() {
        let config = HardwareConfig {
            force_mock: true,
            ..HardwareConfig::default()
        };
        assert_eq!(detect(&config).mode(), DriverMode::Mock);
    }
}

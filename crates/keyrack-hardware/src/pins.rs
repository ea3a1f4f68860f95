//! GPIO control through the `pinctrl` utility.
//!
//! Each write runs `pinctrl set <pin> [op] dh|dl`. Process start-up costs a
//! few milliseconds, well inside the background tick.

use std::path::PathBuf;
use std::process::Command;

use keyrack_core::{Level, PinLine};
use tracing::trace;

use crate::error::{HardwareError, Result};
use crate::traits::PinControl;

/// Pin controller shelling out to `pinctrl`.
#[derive(Debug, Clone)]
pub struct PinctrlPins {
    tool: PathBuf,
}

impl PinctrlPins {
    /// Use `tool` (a name resolved on `PATH` or an absolute path).
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    fn drive(level: Level) -> &'static str {
        match level {
            Level::High => "dh",
            Level::Low => "dl",
        }
    }

    fn run(&self, pin: PinLine, args: &[&str]) -> Result<()> {
        trace!(%pin, ?args, tool = %self.tool.display(), "pinctrl");
        let output = Command::new(&self.tool)
            .arg("set")
            .arg(pin.as_u8().to_string())
            .args(args)
            .output()
            .map_err(|e| HardwareError::pin_write(pin, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HardwareError::pin_write(
                pin,
                format!("{} exited with {}: {}", self.tool.display(), output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

impl PinControl for PinctrlPins {
    fn configure_output(&self, pin: PinLine, initial: Level) -> Result<()> {
        self.run(pin, &["op", Self::drive(initial)])
    }

    fn write(&self, pin: PinLine, level: Level) -> Result<()> {
        self.run(pin, &[Self::drive(level)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_arguments() {
        assert_eq!(PinctrlPins::drive(Level::High), "dh");
        assert_eq!(PinctrlPins::drive(Level::Low), "dl");
    }

    #[test]
    fn test_missing_tool_is_pin_write_error() {
        let pins = PinctrlPins::new("/nonexistent/keyrack-pinctrl");
        let result = pins.write(PinLine::new(17).unwrap(), Level::High);
        assert!(matches!(result, Err(HardwareError::PinWrite { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_reports_status() {
        let pins = PinctrlPins::new("false");
        let error = pins
            .configure_output(PinLine::new(4).unwrap(), Level::High)
            .unwrap_err();
        assert!(error.to_string().contains("exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn test_succeeding_tool() {
        let pins = PinctrlPins::new("true");
        assert!(pins.write(PinLine::new(4).unwrap(), Level::Low).is_ok());
    }
}

use crate::{
    Result,
    constants::{MAX_GPIO_PIN, MAX_SLOT_NUMBER, MIN_SLOT_NUMBER, UID_BYTES},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cabinet slot identifier (1-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotNumber(u8);

impl SlotNumber {
    /// Create a new slot number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlot` if the number is outside 1-10.
    pub fn new(number: u8) -> Result<Self> {
        if !(MIN_SLOT_NUMBER..=MAX_SLOT_NUMBER).contains(&number) {
            return Err(Error::InvalidSlot(format!(
                "slot must be {MIN_SLOT_NUMBER}-{MAX_SLOT_NUMBER}, got {number}"
            )));
        }
        Ok(SlotNumber(number))
    }

    /// Get the raw slot number.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SlotNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for SlotNumber {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        SlotNumber::new(value)
    }
}

impl From<SlotNumber> for u8 {
    fn from(slot: SlotNumber) -> u8 {
        slot.0
    }
}

impl std::str::FromStr for SlotNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let number: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSlot(format!("not a slot number: {s}")))?;
        SlotNumber::new(number)
    }
}

/// GPIO line in BCM numbering (0-27).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PinLine(u8);

impl PinLine {
    /// Create a new pin line with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidPin` if the pin is above GPIO 27.
    pub fn new(pin: u8) -> Result<Self> {
        if pin > MAX_GPIO_PIN {
            return Err(Error::InvalidPin(format!(
                "GPIO must be 0-{MAX_GPIO_PIN}, got {pin}"
            )));
        }
        Ok(PinLine(pin))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for PinLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

impl TryFrom<u8> for PinLine {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        PinLine::new(value)
    }
}

impl From<PinLine> for u8 {
    fn from(pin: PinLine) -> u8 {
        pin.0
    }
}

/// Electrical level of an output line.
///
/// Chip-select lines are active-low; relay lines energize the solenoid at
/// `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Level that selects a reader on the shared bus.
    pub const SELECTED: Level = Level::Low;

    /// Level that releases a reader from the shared bus.
    pub const DESELECTED: Level = Level::High;

    /// Level that opens a slot's lock.
    pub const ENERGIZED: Level = Level::High;

    /// Level that keeps a slot's lock closed.
    pub const DE_ENERGIZED: Level = Level::Low;
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

/// Tag identifier, normalized to 8 uppercase hex characters.
///
/// Only the first four bytes reported by a reader are kept, so the identifier
/// is fixed-width whatever the tag's native UID length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Normalize raw UID bytes read from a tag.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if fewer than four bytes were read.
    ///
    /// # Examples
    ///
    /// ```
    /// use keyrack_core::Uid;
    ///
    /// let uid = Uid::from_bytes(&[0x04, 0xab, 0x0c, 0xef, 0x99, 0x10, 0x80]).unwrap();
    /// assert_eq!(uid.as_str(), "04AB0CEF");
    ///
    /// assert!(Uid::from_bytes(&[0x01, 0x02]).is_err());
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < UID_BYTES {
            return Err(Error::InvalidUid(format!(
                "need at least {UID_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let hex = bytes[..UID_BYTES]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<String>();
        Ok(Uid(hex))
    }

    /// Parse an already formatted UID (case-insensitive).
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` unless the input is exactly 8 hex digits.
    pub fn parse(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase();
        if normalized.len() != UID_BYTES * 2 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidUid(format!(
                "expected {} hex digits, got '{s}'",
                UID_BYTES * 2
            )));
        }
        Ok(Uid(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Uid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Uid::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> String {
        uid.0
    }
}

/// Opaque transaction identifier supplied by the remote authority.
///
/// The coordinator never interprets it; it is echoed back in terminal events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// # Errors
    /// Returns `Error::InvalidToken` if the token is empty or blank.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::InvalidToken("token cannot be empty".to_string()));
        }
        Ok(CorrelationToken(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CorrelationToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CorrelationToken::new(value)
    }
}

impl From<CorrelationToken> for String {
    fn from(token: CorrelationToken) -> String {
        token.0
    }
}

/// Which driver family backs the hardware context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    /// GPIO and SPI are driven for real.
    Real,
    /// Nothing touches hardware; transitions are logged and simulated.
    Mock,
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DriverMode::Real => write!(f, "real"),
            DriverMode::Mock => write!(f, "mock"),
        }
    }
}

/// A tag seen on a slot's reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReading {
    pub slot: SlotNumber,
    pub uid: Uid,
    pub observed_at: DateTime<Utc>,
}

impl TagReading {
    /// Create a reading stamped with the current time.
    #[must_use]
    pub fn now(slot: SlotNumber, uid: Uid) -> Self {
        Self {
            slot,
            uid,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", 1)]
    #[case("05", 5)]
    #[case(" 10 ", 10)]
    fn test_slot_number_valid(#[case] input: &str, #[case] expected: u8) {
        let slot: SlotNumber = input.parse().unwrap();
        assert_eq!(slot.as_u8(), expected);
    }

    #[rstest]
    #[case("0")]
    #[case("11")]
    #[case("abc")]
    fn test_slot_number_invalid(#[case] input: &str) {
        let result: Result<SlotNumber> = input.parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_pin_line_bounds() {
        assert!(PinLine::new(0).is_ok());
        assert!(PinLine::new(27).is_ok());
        assert!(PinLine::new(28).is_err());
        assert_eq!(PinLine::new(17).unwrap().to_string(), "GPIO17");
    }

    #[rstest]
    #[case(&[0xde, 0xad, 0xbe, 0xef], "DEADBEEF")]
    #[case(&[0x04, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f], "040A0B0C")]
    #[case(&[0x00, 0x00, 0x00, 0x01], "00000001")]
    fn test_uid_from_bytes(#[case] bytes: &[u8], #[case] expected: &str) {
        assert_eq!(Uid::from_bytes(bytes).unwrap().as_str(), expected);
    }

    #[test]
    fn test_uid_too_short() {
        assert!(Uid::from_bytes(&[]).is_err());
        assert!(Uid::from_bytes(&[0x01, 0x02, 0x03]).is_err());
    }

    #[rstest]
    #[case("deadbeef", "DEADBEEF")]
    #[case(" 0a0B0c0D ", "0A0B0C0D")]
    fn test_uid_parse(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Uid::parse(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("DEADBEE")]
    #[case("DEADBEEF00")]
    #[case("MOCK0101")]
    fn test_uid_parse_invalid(#[case] input: &str) {
        assert!(Uid::parse(input).is_err());
    }

    #[test]
    fn test_correlation_token() {
        assert_eq!(CorrelationToken::new("txn-77").unwrap().as_str(), "txn-77");
        assert!(CorrelationToken::new("").is_err());
        assert!(CorrelationToken::new("   ").is_err());
    }

    #[test]
    fn test_slot_number_serde() {
        let slot = SlotNumber::new(3).unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "3");
        assert!(serde_json::from_str::<SlotNumber>("12").is_err());
    }

    #[test]
    fn test_level_constants() {
        assert_eq!(Level::SELECTED, Level::Low);
        assert_eq!(Level::DESELECTED, Level::High);
        assert_eq!(Level::ENERGIZED, Level::High);
        assert_eq!(Level::DE_ENERGIZED, Level::Low);
    }
}

//! Cabinet-wide constants and configuration defaults.
//!
//! The timing defaults follow the cabinet's physical behaviour: the background
//! loop cycles quickly enough to catch a badge held briefly against a reader,
//! while the verification tick only has to notice that a key is gone.
//!
//! ```
//! use keyrack_core::constants::*;
//!
//! assert!(DEFAULT_VERIFICATION_INTERVAL_MS > DEFAULT_BACKGROUND_INTERVAL_MS);
//! assert_eq!(DEFAULT_VERIFICATION_TIMEOUT_MS / DEFAULT_VERIFICATION_INTERVAL_MS, 10);
//! ```

// ============================================================================
// Slots and pins
// ============================================================================

/// Lowest slot number a cabinet may configure.
pub const MIN_SLOT_NUMBER: u8 = 1;

/// Highest slot number a cabinet may configure (ten readers per bus).
pub const MAX_SLOT_NUMBER: u8 = 10;

/// Highest BCM GPIO number exposed on the 40-pin header.
pub const MAX_GPIO_PIN: u8 = 27;

/// Number of UID bytes kept when normalizing a tag identifier.
///
/// Tags may report 4, 7 or 10 byte UIDs; only the first four are kept so the
/// identifier has a fixed width of eight hex characters.
pub const UID_BYTES: usize = 4;

/// Chip-select lines for slots 1..=10 (BCM numbering).
pub const DEFAULT_CHIP_SELECT_PINS: [u8; 10] = [4, 5, 6, 12, 13, 16, 19, 20, 21, 26];

/// Relay lines for slots 1..=10 (BCM numbering).
///
/// GPIO 7 is SPI0 CE1; it is free because reader selection is driven through
/// the dedicated chip-select lines above.
pub const DEFAULT_RELAY_PINS: [u8; 10] = [17, 27, 22, 23, 24, 25, 14, 15, 18, 7];

// ============================================================================
// Timing
// ============================================================================

/// Background scan tick (milliseconds).
pub const DEFAULT_BACKGROUND_INTERVAL_MS: u64 = 200;

/// Verification tick while waiting for a key to be pulled (milliseconds).
pub const DEFAULT_VERIFICATION_INTERVAL_MS: u64 = 1000;

/// Verification window after an unlock (milliseconds).
pub const DEFAULT_VERIFICATION_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Hardware
// ============================================================================

/// Pin-control utility used to drive GPIO lines in real mode.
pub const DEFAULT_PIN_TOOL: &str = "pinctrl";

/// SPI device node the reader bank is attached to.
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev0.0";

/// SPI clock for the RC522 readers (Hz).
pub const DEFAULT_SPI_SPEED_HZ: u32 = 1_000_000;

// ============================================================================
// Mock cabinet
// ============================================================================

/// Chance that an idle mock reader sees a badge on one background read.
pub const DEFAULT_BADGE_PROBABILITY: f64 = 0.05;

/// Verification reads before the mock "user" pulls the key.
pub const DEFAULT_PULL_AFTER_READS: u32 = 3;

/// Seed for the mock cabinet RNG.
pub const DEFAULT_MOCK_SEED: u64 = 7;

// ============================================================================
// Event channel
// ============================================================================

/// Remote authority address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:4556";

/// Delay between reconnection attempts (milliseconds).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

/// Connection attempt timeout (milliseconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Capacity of the outbound event queue.
///
/// Events beyond this are dropped rather than buffered.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Longest JSON frame accepted from the remote authority (bytes).
pub const MAX_FRAME_LENGTH: usize = 8 * 1024;

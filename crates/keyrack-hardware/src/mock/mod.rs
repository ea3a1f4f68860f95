//! Mock device implementations for testing and development.
//!
//! Every mock device is a view onto one shared [`MockCabinet`], so pin writes
//! made through [`MockPins`] decide what [`MockTagReader`] and
//! [`SimulatedChip`] find in the selected reader's field.

pub mod cabinet;
pub mod chip;
pub mod pins;
pub mod reader;

// Re-export commonly used types
pub use cabinet::MockCabinet;
pub use chip::SimulatedChip;
pub use pins::MockPins;
pub use reader::MockTagReader;

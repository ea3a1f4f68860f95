use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identity errors
    #[error("Invalid slot number: {0}")]
    InvalidSlot(String),

    #[error("Invalid pin line: {0}")]
    InvalidPin(String),

    #[error("Invalid tag UID: {0}")]
    InvalidUid(String),

    #[error("Invalid correlation token: {0}")]
    InvalidToken(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate slot number in configuration: {0}")]
    DuplicateSlot(u8),

    #[error("Pin collision: GPIO {pin} is used by both {first} and {second}")]
    PinCollision {
        pin: u8,
        first: String,
        second: String,
    },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // State errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

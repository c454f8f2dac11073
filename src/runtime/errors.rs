//! Error types for configuration and decoding

use crossbeam_channel::SendError;

/// Error type for decoder configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Address bytes must be 1-4, got {0}")]
    AddressBytes(u8),

    #[error("Word size must be 8 bits for flash transactions, got {0}")]
    WordSize(u32),

    #[error("Minimum address 0x{min:X} is above maximum address 0x{max:X}")]
    AddressRange { min: u32, max: u32 },

    #[error("Unknown {option} value '{value}'")]
    UnknownOption { option: &'static str, value: String },
}

/// Error type for a decode run
///
/// Malformed bus traffic never ends up here: it is reported through
/// error-class annotations. Only problems that stop the scan do.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid decoder configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Event sink disconnected")]
    SinkDisconnected,
}

impl<T> From<SendError<T>> for DecodeError {
    fn from(_: SendError<T>) -> Self {
        DecodeError::SinkDisconnected
    }
}

/// Result type for decode runs
pub type DecodeResult<T = ()> = Result<T, DecodeError>;

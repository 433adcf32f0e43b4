//! Error types for the normalization engine.
//!
//! Almost nothing in a raw device payload is fatal: missing fields resolve to
//! absent values and malformed sub-trees degrade to empty ones. The variants
//! here cover the few conditions that cannot be absorbed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("No device record: expected a JSON object, got {0}")]
    NoDeviceRecord(&'static str),

    #[error("Device record has neither a device id nor a serial number")]
    MissingIdentifiers,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FleetError {
    /// Whether this error means the input could not describe a device at all.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FleetError::NoDeviceRecord(_) | FleetError::MissingIdentifiers
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;

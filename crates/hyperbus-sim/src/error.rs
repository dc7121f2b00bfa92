//! Error types for the simulated device

use thiserror::Error;

/// Simulator configuration errors
#[derive(Debug, Error)]
pub enum SimError {
    /// Option value could not be parsed
    #[error("Invalid value for {key}: {value}")]
    InvalidParameter { key: &'static str, value: String },

    /// Option name is not recognised
    #[error("Unknown sim option: {0}")]
    UnknownParameter(String),

    /// Memory size must hold at least one wrap group
    #[error("Memory size of {size} words is smaller than the {wrap}-word wrap group")]
    MemoryTooSmall { size: usize, wrap: u16 },

    /// Wrap group must be a power of two
    #[error("Wrap length {0} is not a power of two")]
    WrapLength(u16),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

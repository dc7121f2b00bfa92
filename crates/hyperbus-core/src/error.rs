//! Error types for hyperbus-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Why a set of timing parameters was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFault {
    /// Initial latency must be at least one clock
    ZeroLatency,
    /// Chip-select recovery must be at least one clock
    ZeroRecovery,
    /// Doubled initial latency does not fit in a cycle counter
    LatencyOverflow(u32),
    /// tCSM cannot fit one complete chip-select window
    ChipSelectWindow {
        /// Configured maximum chip-select-low cycles
        tcsm: u32,
        /// Cycles needed for setup, CA, worst-case latency and one data cycle
        required: u32,
    },
    /// RWDS would be sampled after the latency count could already end
    SampleOffset {
        /// Configured offset, in cycles from the first CA cycle
        offset: u32,
        /// First offset that is no longer allowed
        limit: u32,
    },
    /// Watchdog must allow at least one stalled cycle
    ZeroWatchdog,
    /// Wrapped burst length must be a power of two
    WrapLength(u16),
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Construction errors
    /// Timing parameters failed validation
    InvalidConfig(ConfigFault),

    // Request errors
    /// Address does not map onto the selected address space
    InvalidAddress,
    /// Burst length is zero or disagrees with the payload or mask
    InvalidBurst,
    /// A transaction is already pending or in flight
    Busy,
    /// Handle does not refer to a known transaction
    UnknownHandle,
    /// Chip select is already asserted for this transaction
    NotCancellable,

    // Transaction faults (reported inside a TransferResult)
    /// RWDS latency request was not sampled at its defined cycle
    LatencySampleFault,
    /// No data progress within the watchdog window
    TimedOut,

    // Wire errors
    /// Wire beats do not form whole words
    Framing,
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLatency => write!(f, "initial latency must be non-zero"),
            Self::ZeroRecovery => write!(f, "chip-select recovery must be non-zero"),
            Self::LatencyOverflow(latency) => write!(
                f,
                "initial latency of {} cycles overflows when doubled",
                latency
            ),
            Self::ChipSelectWindow { tcsm, required } => write!(
                f,
                "tCSM of {} cycles is shorter than the minimum window of {} cycles",
                tcsm, required
            ),
            Self::SampleOffset { offset, limit } => write!(
                f,
                "RWDS sample offset {} must be below {} cycles",
                offset, limit
            ),
            Self::ZeroWatchdog => write!(f, "watchdog must be non-zero"),
            Self::WrapLength(len) => {
                write!(f, "wrapped burst length {} is not a power of two", len)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(fault) => write!(f, "invalid timing configuration: {}", fault),
            Self::InvalidAddress => write!(f, "address out of range for address space"),
            Self::InvalidBurst => write!(f, "invalid burst length"),
            Self::Busy => write!(f, "controller busy"),
            Self::UnknownHandle => write!(f, "unknown transaction handle"),
            Self::NotCancellable => write!(f, "transaction already on the bus"),
            Self::LatencySampleFault => write!(f, "RWDS latency sample missed"),
            Self::TimedOut => write!(f, "transaction timed out"),
            Self::Framing => write!(f, "wire beats do not form whole words"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

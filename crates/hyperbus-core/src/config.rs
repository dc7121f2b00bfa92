//! Timing configuration
//!
//! [`TimingParams`] is the raw, user-editable form (builder methods, RON
//! files). [`TimingConfig`] is the validated form handed to the controller;
//! it cannot be changed after construction.

use crate::ca::CA_CYCLES;
use crate::error::{ConfigFault, Error, Result};

/// Default initial latency in clock cycles (HyperRAM power-on value)
pub const DEFAULT_INITIAL_LATENCY: u32 = 6;

/// Default tCSM: 4 us at 100 MHz
pub const DEFAULT_TCSM: u32 = 400;

/// Default wrapped burst length in words (32-byte group)
pub const DEFAULT_WRAP_WORDS: u16 = 16;

/// Watchdog used when none is configured: four latency periods plus slack
pub const fn default_watchdog(initial_latency: u32) -> u32 {
    initial_latency.saturating_mul(4).saturating_add(16)
}

/// Data bus width
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusWidth {
    /// DQ[7:0], one byte per clock edge
    #[default]
    X8,
    /// DQ[15:0], one word per clock edge (CA still uses DQ[7:0])
    X16,
}

impl BusWidth {
    /// Wire beats needed for one 16-bit word
    pub const fn beats_per_word(&self) -> usize {
        match self {
            Self::X8 => 2,
            Self::X16 => 1,
        }
    }

    /// Words carried by one clock cycle (two edges)
    pub const fn words_per_cycle(&self) -> usize {
        2 / self.beats_per_word()
    }
}

/// Raw timing parameters
///
/// Every field has a sensible default; use the `with_*` methods or a RON
/// file to override them, then validate with [`TimingConfig::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimingParams {
    /// Clock cycles between CA and the first data beat
    pub initial_latency: u32,
    /// Always use `initial_latency`, never sample RWDS
    pub fixed_latency: bool,
    /// Cycles chip select is held low before the first CA clock
    pub cs_setup: u32,
    /// Cycles chip select is held high after a transaction
    pub cs_hold: u32,
    /// Maximum cycles chip select may stay low (device refresh limit)
    pub tcsm: u32,
    /// Data cycles without progress before a transfer times out
    pub watchdog: Option<u32>,
    /// Cycle, counted from the first CA cycle, at which RWDS is sampled
    pub sample_offset: u32,
    /// Data bus width
    pub bus_width: BusWidth,
    /// Wrapped burst group length in words
    pub wrap_words: u16,
    /// Register writes start their data phase right after CA
    pub zero_latency_register_writes: bool,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            initial_latency: DEFAULT_INITIAL_LATENCY,
            fixed_latency: true,
            cs_setup: 1,
            cs_hold: 2,
            tcsm: DEFAULT_TCSM,
            watchdog: None,
            sample_offset: 1,
            bus_width: BusWidth::X8,
            wrap_words: DEFAULT_WRAP_WORDS,
            zero_latency_register_writes: true,
        }
    }
}

impl TimingParams {
    /// Set the initial latency
    pub fn with_initial_latency(mut self, cycles: u32) -> Self {
        self.initial_latency = cycles;
        self
    }

    /// Select fixed (true) or RWDS-sampled (false) latency
    pub fn with_fixed_latency(mut self, fixed: bool) -> Self {
        self.fixed_latency = fixed;
        self
    }

    /// Set chip-select setup cycles
    pub fn with_cs_setup(mut self, cycles: u32) -> Self {
        self.cs_setup = cycles;
        self
    }

    /// Set chip-select hold/recovery cycles
    pub fn with_cs_hold(mut self, cycles: u32) -> Self {
        self.cs_hold = cycles;
        self
    }

    /// Set the maximum chip-select-low duration
    pub fn with_tcsm(mut self, cycles: u32) -> Self {
        self.tcsm = cycles;
        self
    }

    /// Set the data-phase watchdog
    pub fn with_watchdog(mut self, cycles: u32) -> Self {
        self.watchdog = Some(cycles);
        self
    }

    /// Set the RWDS sample offset
    pub fn with_sample_offset(mut self, cycles: u32) -> Self {
        self.sample_offset = cycles;
        self
    }

    /// Set the data bus width
    pub fn with_bus_width(mut self, width: BusWidth) -> Self {
        self.bus_width = width;
        self
    }

    /// Set the wrapped burst group length
    pub fn with_wrap_words(mut self, words: u16) -> Self {
        self.wrap_words = words;
        self
    }

    /// Enable or disable zero-latency register writes
    pub fn with_zero_latency_register_writes(mut self, enabled: bool) -> Self {
        self.zero_latency_register_writes = enabled;
        self
    }

    /// Worst-case latency in cycles for these parameters
    pub fn max_latency(&self) -> u32 {
        if self.fixed_latency {
            self.initial_latency
        } else {
            self.initial_latency.saturating_mul(2)
        }
    }

    /// Shortest chip-select window that still moves one data cycle
    pub fn min_window(&self) -> u32 {
        self.cs_setup
            .saturating_add(CA_CYCLES)
            .saturating_add(self.max_latency())
            .saturating_add(1)
    }
}

/// Validated, immutable timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    initial_latency: u32,
    fixed_latency: bool,
    cs_setup: u32,
    cs_hold: u32,
    tcsm: u32,
    watchdog: u32,
    sample_offset: u32,
    bus_width: BusWidth,
    wrap_words: u16,
    zero_latency_register_writes: bool,
}

impl TimingConfig {
    /// Validate `params`
    pub fn new(params: TimingParams) -> Result<Self> {
        if params.initial_latency == 0 {
            return Err(Error::InvalidConfig(ConfigFault::ZeroLatency));
        }
        if params.cs_hold == 0 {
            return Err(Error::InvalidConfig(ConfigFault::ZeroRecovery));
        }
        if !params.fixed_latency && params.initial_latency.checked_mul(2).is_none() {
            return Err(Error::InvalidConfig(ConfigFault::LatencyOverflow(
                params.initial_latency,
            )));
        }

        let required = params.min_window();
        if params.tcsm < required {
            return Err(Error::InvalidConfig(ConfigFault::ChipSelectWindow {
                tcsm: params.tcsm,
                required,
            }));
        }

        if !params.fixed_latency {
            let limit = CA_CYCLES.saturating_add(params.initial_latency);
            if params.sample_offset >= limit {
                return Err(Error::InvalidConfig(ConfigFault::SampleOffset {
                    offset: params.sample_offset,
                    limit,
                }));
            }
        }

        let watchdog = params
            .watchdog
            .unwrap_or_else(|| default_watchdog(params.initial_latency));
        if watchdog == 0 {
            return Err(Error::InvalidConfig(ConfigFault::ZeroWatchdog));
        }

        if !params.wrap_words.is_power_of_two() {
            return Err(Error::InvalidConfig(ConfigFault::WrapLength(
                params.wrap_words,
            )));
        }

        log::debug!(
            "hyperbus: timing latency={}{} setup={} hold={} tcsm={} watchdog={}",
            params.initial_latency,
            if params.fixed_latency { " (fixed)" } else { "" },
            params.cs_setup,
            params.cs_hold,
            params.tcsm,
            watchdog
        );

        Ok(Self {
            initial_latency: params.initial_latency,
            fixed_latency: params.fixed_latency,
            cs_setup: params.cs_setup,
            cs_hold: params.cs_hold,
            tcsm: params.tcsm,
            watchdog,
            sample_offset: params.sample_offset,
            bus_width: params.bus_width,
            wrap_words: params.wrap_words,
            zero_latency_register_writes: params.zero_latency_register_writes,
        })
    }

    /// Initial latency in cycles
    pub fn initial_latency(&self) -> u32 {
        self.initial_latency
    }

    /// True when RWDS is never sampled
    pub fn fixed_latency(&self) -> bool {
        self.fixed_latency
    }

    /// Chip-select setup cycles
    pub fn cs_setup(&self) -> u32 {
        self.cs_setup
    }

    /// Chip-select hold/recovery cycles
    pub fn cs_hold(&self) -> u32 {
        self.cs_hold
    }

    /// Maximum chip-select-low cycles
    pub fn tcsm(&self) -> u32 {
        self.tcsm
    }

    /// Data-phase watchdog in cycles
    pub fn watchdog(&self) -> u32 {
        self.watchdog
    }

    /// RWDS sample offset from the first CA cycle
    pub fn sample_offset(&self) -> u32 {
        self.sample_offset
    }

    /// Data bus width
    pub fn bus_width(&self) -> BusWidth {
        self.bus_width
    }

    /// Wrapped burst group length in words
    pub fn wrap_words(&self) -> u16 {
        self.wrap_words
    }

    /// Register writes skip the latency phase
    pub fn zero_latency_register_writes(&self) -> bool {
        self.zero_latency_register_writes
    }

    /// Convert back to raw parameters (watchdog made explicit)
    pub fn to_params(&self) -> TimingParams {
        TimingParams {
            initial_latency: self.initial_latency,
            fixed_latency: self.fixed_latency,
            cs_setup: self.cs_setup,
            cs_hold: self.cs_hold,
            tcsm: self.tcsm,
            watchdog: Some(self.watchdog),
            sample_offset: self.sample_offset,
            bus_width: self.bus_width,
            wrap_words: self.wrap_words,
            zero_latency_register_writes: self.zero_latency_register_writes,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let params = TimingParams::default();
        Self {
            initial_latency: params.initial_latency,
            fixed_latency: params.fixed_latency,
            cs_setup: params.cs_setup,
            cs_hold: params.cs_hold,
            tcsm: params.tcsm,
            watchdog: default_watchdog(params.initial_latency),
            sample_offset: params.sample_offset,
            bus_width: params.bus_width,
            wrap_words: params.wrap_words,
            zero_latency_register_writes: params.zero_latency_register_writes,
        }
    }
}

#[cfg(feature = "std")]
pub use file::ConfigFileError;

#[cfg(feature = "std")]
mod file {
    use super::{TimingConfig, TimingParams};
    use std::path::Path;
    use thiserror::Error;

    /// Errors loading a timing file
    #[derive(Debug, Error)]
    pub enum ConfigFileError {
        /// File could not be read
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        /// RON syntax or schema error
        #[error("Parse error: {0}")]
        Parse(#[from] ron::error::SpannedError),

        /// Parameters parsed but failed validation
        #[error("{0}")]
        Invalid(#[from] crate::error::Error),
    }

    impl TimingParams {
        /// Parse parameters from RON text; missing fields keep their defaults
        pub fn from_ron(text: &str) -> Result<Self, ConfigFileError> {
            Ok(ron::from_str(text)?)
        }
    }

    impl TimingConfig {
        /// Load and validate a RON timing file
        pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
            let text = std::fs::read_to_string(path)?;
            let params = TimingParams::from_ron(&text)?;
            log::debug!("hyperbus: loaded timing from {}", path.display());
            Ok(TimingConfig::new(params)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TimingConfig::new(TimingParams::default()).unwrap();
        assert_eq!(config, TimingConfig::default());
        assert_eq!(config.watchdog(), 40);
    }

    #[test]
    fn test_zero_latency_rejected() {
        let params = TimingParams::default().with_initial_latency(0);
        assert_eq!(
            TimingConfig::new(params),
            Err(Error::InvalidConfig(ConfigFault::ZeroLatency))
        );
    }

    #[test]
    fn test_zero_recovery_rejected() {
        let params = TimingParams::default().with_cs_hold(0);
        assert_eq!(
            TimingConfig::new(params),
            Err(Error::InvalidConfig(ConfigFault::ZeroRecovery))
        );
    }

    #[test]
    fn test_tcsm_must_fit_one_window() {
        // setup 2 + CA 3 + latency 6 + one data cycle
        let params = TimingParams::default()
            .with_cs_setup(2)
            .with_tcsm(11);
        assert_eq!(
            TimingConfig::new(params.clone()),
            Err(Error::InvalidConfig(ConfigFault::ChipSelectWindow {
                tcsm: 11,
                required: 12
            }))
        );
        assert!(TimingConfig::new(params.clone().with_tcsm(12)).is_ok());

        // Variable latency doubles the worst case
        let params = params.with_tcsm(12).with_fixed_latency(false);
        assert_eq!(
            TimingConfig::new(params),
            Err(Error::InvalidConfig(ConfigFault::ChipSelectWindow {
                tcsm: 12,
                required: 18
            }))
        );
    }

    #[test]
    fn test_sample_offset_limit() {
        let params = TimingParams::default()
            .with_fixed_latency(false)
            .with_sample_offset(9);
        assert_eq!(
            TimingConfig::new(params.clone()),
            Err(Error::InvalidConfig(ConfigFault::SampleOffset {
                offset: 9,
                limit: 9
            }))
        );
        assert!(TimingConfig::new(params.with_sample_offset(8)).is_ok());
    }

    #[test]
    fn test_doubled_latency_must_fit() {
        let params = TimingParams::default()
            .with_initial_latency(0x8000_0000)
            .with_fixed_latency(false)
            .with_tcsm(u32::MAX);
        assert_eq!(
            TimingConfig::new(params.clone()),
            Err(Error::InvalidConfig(ConfigFault::LatencyOverflow(0x8000_0000)))
        );

        // Fixed latency never doubles
        let config = TimingConfig::new(params.with_fixed_latency(true)).unwrap();
        assert_eq!(config.watchdog(), u32::MAX);

        let params = TimingParams::default()
            .with_initial_latency(0x7FFF_FFFF)
            .with_fixed_latency(false)
            .with_tcsm(u32::MAX);
        assert!(TimingConfig::new(params).is_ok());
    }

    #[test]
    fn test_default_watchdog_shared() {
        assert_eq!(default_watchdog(DEFAULT_INITIAL_LATENCY), 40);
        assert_eq!(TimingConfig::default().watchdog(), default_watchdog(DEFAULT_INITIAL_LATENCY));
        assert_eq!(default_watchdog(u32::MAX), u32::MAX);

        let config = TimingConfig::new(TimingParams::default().with_initial_latency(9)).unwrap();
        assert_eq!(config.watchdog(), default_watchdog(9));
    }

    #[test]
    fn test_wrap_length_power_of_two() {
        let params = TimingParams::default().with_wrap_words(12);
        assert_eq!(
            TimingConfig::new(params),
            Err(Error::InvalidConfig(ConfigFault::WrapLength(12)))
        );
    }

    #[test]
    fn test_zero_watchdog_rejected() {
        let params = TimingParams::default().with_watchdog(0);
        assert_eq!(
            TimingConfig::new(params),
            Err(Error::InvalidConfig(ConfigFault::ZeroWatchdog))
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_load_ron() {
        let ron = r#"
        (
            initial_latency: 7,
            fixed_latency: false,
            cs_setup: 2,
            tcsm: 256,
            bus_width: X16,
        )
        "#;

        let params = TimingParams::from_ron(ron).unwrap();
        assert_eq!(params.initial_latency, 7);
        assert!(!params.fixed_latency);
        assert_eq!(params.cs_hold, 2);
        assert_eq!(params.bus_width, BusWidth::X16);

        let config = TimingConfig::new(params).unwrap();
        assert_eq!(config.tcsm(), 256);
        assert_eq!(config.watchdog(), 44);
    }
}

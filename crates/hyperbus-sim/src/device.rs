//! Simulated HyperRAM device
//!
//! The model sits on the device side of [`HyperBusPhy`]: it sees chip select,
//! CA beats, latency clocks and data beats exactly as the controller emits
//! them, and answers the way a HyperRAM would.

use std::str::FromStr;

use hyperbus_core::ca::{self, CommandAddress, DecodedCa, RegisterId, CA_BEATS};
use hyperbus_core::config::{
    BusWidth, TimingConfig, DEFAULT_INITIAL_LATENCY, DEFAULT_TCSM, DEFAULT_WRAP_WORDS,
};
use hyperbus_core::phy::{HyperBusPhy, WireEvent};
use hyperbus_core::serdes::WireBeat;
use hyperbus_core::transaction::{AddressSpace, BurstType, Direction};

use crate::error::{Result, SimError};

/// Default memory size in 16-bit words (128 KiB)
pub const DEFAULT_SIZE_WORDS: usize = 1 << 16;
/// Identification register 0 (64 Mbit HyperRAM)
pub const DEFAULT_ID0: u16 = 0x0C81;
/// Identification register 1
pub const DEFAULT_ID1: u16 = 0x0001;
/// Configuration register 0 after reset
pub const DEFAULT_CR0: u16 = 0x8F1F;
/// Configuration register 1 after reset
pub const DEFAULT_CR1: u16 = 0xFFC1;

/// When the device asks for a second latency period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraLatency {
    /// RWDS stays low during CA
    #[default]
    Never,
    /// RWDS is high on every access
    Always,
    /// Every other chip-select window, starting with the first
    Alternate,
}

impl FromStr for ExtraLatency {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "alternate" => Ok(Self::Alternate),
            _ => Err(()),
        }
    }
}

/// Configuration for the simulated device
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Memory array size in words
    pub size_words: usize,
    /// Initial latency in clocks
    pub initial_latency: u32,
    /// Device runs in fixed-latency mode
    pub fixed_latency: bool,
    /// Data bus width
    pub bus_width: BusWidth,
    /// Wrapped-burst group length in words
    pub wrap_words: u16,
    /// Register writes go straight to data
    pub zero_latency_register_writes: bool,
    /// Chip-select low limit checked by the device
    pub tcsm: u32,
    /// Extra-latency request policy
    pub extra_latency: ExtraLatency,
    /// Number of RWDS samples to leave undriven
    pub drop_rwds_samples: u32,
    /// Clocks without read data at the start of every read data phase
    pub read_stall_cycles: u32,
    /// ID0 value
    pub id0: u16,
    /// ID1 value
    pub id1: u16,
    /// Record every PHY call
    pub trace: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            size_words: DEFAULT_SIZE_WORDS,
            initial_latency: DEFAULT_INITIAL_LATENCY,
            fixed_latency: true,
            bus_width: BusWidth::X8,
            wrap_words: DEFAULT_WRAP_WORDS,
            zero_latency_register_writes: true,
            tcsm: DEFAULT_TCSM,
            extra_latency: ExtraLatency::Never,
            drop_rwds_samples: 0,
            read_stall_cycles: 0,
            id0: DEFAULT_ID0,
            id1: DEFAULT_ID1,
            trace: false,
        }
    }
}

impl SimConfig {
    /// Device configuration agreeing with a controller's timing
    pub fn matching(timing: &TimingConfig) -> Self {
        Self {
            initial_latency: timing.initial_latency(),
            fixed_latency: timing.fixed_latency(),
            bus_width: timing.bus_width(),
            wrap_words: timing.wrap_words(),
            zero_latency_register_writes: timing.zero_latency_register_writes(),
            tcsm: timing.tcsm(),
            ..Self::default()
        }
    }

    /// Set the memory size in words
    pub fn with_size_words(mut self, words: usize) -> Self {
        self.size_words = words;
        self
    }

    /// Set the extra-latency policy
    pub fn with_extra_latency(mut self, policy: ExtraLatency) -> Self {
        self.extra_latency = policy;
        self
    }

    /// Leave the next `count` RWDS samples undriven
    pub fn with_drop_rwds_samples(mut self, count: u32) -> Self {
        self.drop_rwds_samples = count;
        self
    }

    /// Withhold read data for `cycles` clocks per data phase
    pub fn with_read_stall(mut self, cycles: u32) -> Self {
        self.read_stall_cycles = cycles;
        self
    }

    /// Enable or disable the wire trace
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Apply `key=value` options on top of this configuration
    pub fn apply_options(mut self, options: &[(&str, &str)]) -> Result<Self> {
        for (key, value) in options {
            match *key {
                "size" => self.size_words = parse_num(value, "size")?,
                "latency" => self.initial_latency = parse_num(value, "latency")?,
                "fixed" => self.fixed_latency = parse_bool(value, "fixed")?,
                "width" => {
                    self.bus_width = match *value {
                        "8" | "x8" => BusWidth::X8,
                        "16" | "x16" => BusWidth::X16,
                        _ => return Err(invalid("width", value)),
                    }
                }
                "wrap" => self.wrap_words = parse_num(value, "wrap")?,
                "tcsm" => self.tcsm = parse_num(value, "tcsm")?,
                "extra" => {
                    self.extra_latency = value.parse().map_err(|_| invalid("extra", value))?
                }
                "drop-rwds" => self.drop_rwds_samples = parse_num(value, "drop-rwds")?,
                "stall" => self.read_stall_cycles = parse_num(value, "stall")?,
                "id0" => self.id0 = parse_num(value, "id0")?,
                "id1" => self.id1 = parse_num(value, "id1")?,
                "trace" => self.trace = parse_bool(value, "trace")?,
                other => return Err(SimError::UnknownParameter(other.to_string())),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the memory geometry
    pub fn validate(&self) -> Result<()> {
        if !self.wrap_words.is_power_of_two() {
            return Err(SimError::WrapLength(self.wrap_words));
        }
        if self.size_words < usize::from(self.wrap_words) {
            return Err(SimError::MemoryTooSmall {
                size: self.size_words,
                wrap: self.wrap_words,
            });
        }
        Ok(())
    }
}

/// Build a device configuration from `key=value` options
///
/// Supported options:
/// - `size=<words>`: memory size (decimal or `0x` hex)
/// - `latency=<clocks>`, `fixed=<bool>`, `width=8|16`, `wrap=<words>`, `tcsm=<clocks>`
/// - `extra=never|always|alternate`: extra-latency requests
/// - `drop-rwds=<n>`: leave the next n RWDS samples undriven
/// - `stall=<clocks>`: withhold read data at the start of each data phase
/// - `id0=<hex>`, `id1=<hex>`, `trace=<bool>`
pub fn parse_options(options: &[(&str, &str)]) -> Result<SimConfig> {
    SimConfig::default().apply_options(options)
}

fn invalid(key: &'static str, value: &str) -> SimError {
    SimError::InvalidParameter {
        key,
        value: value.to_string(),
    }
}

fn parse_num<T: TryFrom<u64>>(value: &str, key: &'static str) -> Result<T> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| invalid(key, value))
}

fn parse_bool(value: &str, key: &'static str) -> Result<bool> {
    match value {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

/// Decoded access inside one chip-select window
#[derive(Debug)]
struct Access {
    ca: DecodedCa,
    latency_left: u32,
    stall_left: u32,
    /// Next word index within the burst
    word: u32,
    /// x8 high byte waiting for its low byte, with its mask
    high: Option<(u8, bool)>,
}

#[derive(Debug)]
struct Window {
    ca: heapless::Vec<u8, CA_BEATS>,
    access: Option<Access>,
    extra: bool,
}

/// HyperRAM model driven through [`HyperBusPhy`]
pub struct SimHyperRam {
    config: SimConfig,
    memory: Vec<u16>,
    registers: [u16; 4],
    window: Option<Window>,
    cs_low: bool,
    cs_cycles: u32,
    max_cs_low: u32,
    tcsm_violations: u32,
    windows: u32,
    next_extra: bool,
    drops_left: u32,
    trace: Vec<WireEvent>,
}

impl SimHyperRam {
    /// Create a device with zeroed memory
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut registers = [0u16; 4];
        registers[RegisterId::Id0.index() as usize] = config.id0;
        registers[RegisterId::Id1.index() as usize] = config.id1;
        registers[RegisterId::Cr0.index() as usize] = DEFAULT_CR0;
        registers[RegisterId::Cr1.index() as usize] = DEFAULT_CR1;

        log::debug!(
            "sim: {} words, latency {}{}, {:?}",
            config.size_words,
            config.initial_latency,
            if config.fixed_latency { " fixed" } else { "" },
            config.bus_width
        );

        Ok(Self {
            memory: vec![0; config.size_words],
            registers,
            window: None,
            cs_low: false,
            cs_cycles: 0,
            max_cs_low: 0,
            tcsm_violations: 0,
            windows: 0,
            next_extra: true,
            drops_left: config.drop_rwds_samples,
            trace: Vec::new(),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Get a reference to the memory array
    pub fn memory(&self) -> &[u16] {
        &self.memory
    }

    /// Get a mutable reference to the memory array
    pub fn memory_mut(&mut self) -> &mut [u16] {
        &mut self.memory
    }

    /// Copy `words` into memory at `offset`, clipped to the array
    pub fn load(&mut self, offset: usize, words: &[u16]) {
        let start = offset.min(self.memory.len());
        let len = words.len().min(self.memory.len() - start);
        self.memory[start..start + len].copy_from_slice(&words[..len]);
    }

    /// Current register value
    pub fn register(&self, reg: RegisterId) -> u16 {
        self.registers[reg.index() as usize]
    }

    /// Recorded wire events (empty unless tracing)
    pub fn trace(&self) -> &[WireEvent] {
        &self.trace
    }

    /// Take the recorded wire events, leaving the trace empty
    pub fn take_trace(&mut self) -> Vec<WireEvent> {
        std::mem::take(&mut self.trace)
    }

    /// Longest chip-select-low run seen, in clocks
    pub fn max_cs_low(&self) -> u32 {
        self.max_cs_low
    }

    /// Chip-select windows that exceeded tCSM
    pub fn tcsm_violations(&self) -> u32 {
        self.tcsm_violations
    }

    /// Chip-select windows opened so far
    pub fn windows(&self) -> u32 {
        self.windows
    }

    /// Returns true while CS# is low
    pub fn is_selected(&self) -> bool {
        self.cs_low
    }

    fn record(&mut self, event: WireEvent) {
        if self.config.trace {
            self.trace.push(event);
        }
    }

    fn count_cycle(&mut self) {
        if !self.cs_low {
            return;
        }
        self.cs_cycles += 1;
        self.max_cs_low = self.max_cs_low.max(self.cs_cycles);
        if self.cs_cycles == self.config.tcsm.saturating_add(1) {
            log::warn!("sim: CS# low for more than {} clocks", self.config.tcsm);
            self.tcsm_violations += 1;
        }
    }

    fn window_extra(&mut self) -> bool {
        match self.config.extra_latency {
            ExtraLatency::Never => false,
            ExtraLatency::Always => true,
            ExtraLatency::Alternate => {
                let extra = self.next_extra;
                self.next_extra = !extra;
                extra
            }
        }
    }

    fn latency_for(&self, ca: &DecodedCa, extra: bool) -> u32 {
        let register_write = ca.direction == Direction::Write && ca.space == AddressSpace::Register;
        if register_write && self.config.zero_latency_register_writes {
            0
        } else if extra && !self.config.fixed_latency {
            self.config.initial_latency.saturating_mul(2)
        } else {
            self.config.initial_latency
        }
    }

    /// Memory index of burst word `index`
    fn word_address(&self, ca: &DecodedCa, index: u32) -> usize {
        let address = match ca.burst_type {
            BurstType::Linear => ca.address.wrapping_add(index),
            BurstType::Wrapped => {
                let wrap = u32::from(self.config.wrap_words);
                let base = ca.address & !(wrap - 1);
                base | ((ca.address - base).wrapping_add(index) % wrap)
            }
        };
        address as usize % self.memory.len()
    }

    fn load_word(&self, ca: &DecodedCa, index: u32) -> u16 {
        match ca.space {
            AddressSpace::Register => self.registers[ca.address as usize],
            AddressSpace::Memory => self.memory[self.word_address(ca, index)],
        }
    }

    fn store_word(&mut self, ca: &DecodedCa, index: u32, bytes: [u8; 2], masked: [bool; 2]) {
        if masked == [true, true] {
            return;
        }
        let slot = match ca.space {
            AddressSpace::Register => {
                let reg = RegisterId::ALL[ca.address as usize];
                if !reg.is_writable() || index > 0 {
                    log::warn!("sim: write to {} ignored", reg.name());
                    return;
                }
                log::debug!("sim: {} <- {:02X}{:02X}", reg.name(), bytes[0], bytes[1]);
                &mut self.registers[ca.address as usize]
            }
            AddressSpace::Memory => {
                let i = self.word_address(ca, index);
                &mut self.memory[i]
            }
        };

        let mut word = *slot;
        if !masked[0] {
            word = (word & 0x00FF) | (u16::from(bytes[0]) << 8);
        }
        if !masked[1] {
            word = (word & 0xFF00) | u16::from(bytes[1]);
        }
        *slot = word;
    }

    fn write_beat(&mut self, access: &mut Access, beat: WireBeat) {
        match self.config.bus_width {
            BusWidth::X8 => {
                let byte = beat.data as u8;
                let masked = beat.mask & 1 != 0;
                match access.high.take() {
                    Some((high, high_masked)) => {
                        self.store_word(&access.ca, access.word, [high, byte], [high_masked, masked]);
                        access.word += 1;
                    }
                    None => access.high = Some((byte, masked)),
                }
            }
            BusWidth::X16 => {
                let [high, low] = beat.data.to_be_bytes();
                let masked = [beat.mask & 0b10 != 0, beat.mask & 0b01 != 0];
                self.store_word(&access.ca, access.word, [high, low], masked);
                access.word += 1;
            }
        }
    }

    fn read_cycle(&self, access: &mut Access) -> [u16; 2] {
        match self.config.bus_width {
            BusWidth::X8 => {
                let word = self.load_word(&access.ca, access.word);
                access.word += 1;
                [word >> 8, word & 0xFF]
            }
            BusWidth::X16 => {
                let first = self.load_word(&access.ca, access.word);
                let second = self.load_word(&access.ca, access.word + 1);
                access.word += 2;
                [first, second]
            }
        }
    }

    /// Open the access once all CA bytes are in
    fn start_access(&self, window: &Window) -> Option<Access> {
        let bytes: [u8; CA_BEATS] = window.ca.as_slice().try_into().ok()?;
        let ca = match ca::decode(&CommandAddress::from_bytes(bytes)) {
            Ok(ca) => ca,
            Err(e) => {
                log::warn!("sim: ignoring CA {:02X?}: {}", bytes, e);
                return None;
            }
        };
        let latency_left = self.latency_for(&ca, window.extra);
        log::trace!("sim: {:?}, latency {}", ca, latency_left);
        Some(Access {
            latency_left,
            stall_left: match ca.direction {
                Direction::Read => self.config.read_stall_cycles,
                Direction::Write => 0,
            },
            word: 0,
            high: None,
            ca,
        })
    }

    fn bus_cycle(&mut self, window: &mut Window, drive: Option<[WireBeat; 2]>) -> Option<[u16; 2]> {
        if window.ca.len() < CA_BEATS {
            match drive {
                Some(beats) => {
                    for beat in beats {
                        let _ = window.ca.push(beat.data as u8);
                    }
                    if window.ca.len() == CA_BEATS {
                        window.access = self.start_access(window);
                    }
                }
                None => log::warn!("sim: DQ released during CA"),
            }
            return None;
        }

        let access = window.access.as_mut()?;
        if access.latency_left > 0 {
            access.latency_left -= 1;
            return None;
        }

        match (access.ca.direction, drive) {
            (Direction::Write, Some(beats)) => {
                for beat in beats {
                    self.write_beat(access, beat);
                }
                None
            }
            (Direction::Read, None) => {
                if access.stall_left > 0 {
                    access.stall_left -= 1;
                    return None;
                }
                Some(self.read_cycle(access))
            }
            (direction, _) => {
                log::warn!("sim: bus turnaround mismatch during {:?}", direction);
                None
            }
        }
    }
}

impl HyperBusPhy for SimHyperRam {
    fn set_cs(&mut self, asserted: bool) {
        self.record(WireEvent::ChipSelect { asserted });
        if asserted && !self.cs_low {
            self.cs_low = true;
            self.cs_cycles = 0;
            self.windows += 1;
            let extra = self.window_extra();
            self.window = Some(Window {
                ca: heapless::Vec::new(),
                access: None,
                extra,
            });
        } else if !asserted {
            self.cs_low = false;
            self.window = None;
        }
    }

    fn idle(&mut self) {
        self.count_cycle();
        self.record(WireEvent::Idle);
    }

    fn clock(&mut self, drive: Option<[WireBeat; 2]>) -> Option<[u16; 2]> {
        self.count_cycle();
        let reply = match self.window.take() {
            Some(mut window) => {
                let reply = self.bus_cycle(&mut window, drive);
                self.window = Some(window);
                reply
            }
            None => None,
        };
        self.record(match drive {
            Some(beats) => WireEvent::Drive { beats },
            None => WireEvent::Receive { beats: reply },
        });
        reply
    }

    fn sample_rwds(&mut self) -> Option<bool> {
        let level = match self.window.as_ref() {
            None => None,
            Some(_) if self.drops_left > 0 => {
                self.drops_left -= 1;
                log::debug!("sim: leaving RWDS undriven");
                None
            }
            Some(window) => Some(window.extra),
        };
        self.record(WireEvent::RwdsSample { level });
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_and_send_ca(dev: &mut SimHyperRam, ca: CommandAddress) {
        dev.set_cs(true);
        let bytes = ca.to_bytes();
        for pair in bytes.chunks(2) {
            dev.clock(Some([
                WireBeat::new(u16::from(pair[0])),
                WireBeat::new(u16::from(pair[1])),
            ]));
        }
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[
            ("size", "0x1000"),
            ("latency", "7"),
            ("fixed", "false"),
            ("width", "16"),
            ("extra", "alternate"),
            ("drop-rwds", "1"),
            ("stall", "3"),
            ("id0", "0x0C86"),
            ("trace", "yes"),
        ])
        .unwrap();
        assert_eq!(config.size_words, 0x1000);
        assert_eq!(config.initial_latency, 7);
        assert!(!config.fixed_latency);
        assert_eq!(config.bus_width, BusWidth::X16);
        assert_eq!(config.extra_latency, ExtraLatency::Alternate);
        assert_eq!(config.drop_rwds_samples, 1);
        assert_eq!(config.read_stall_cycles, 3);
        assert_eq!(config.id0, 0x0C86);
        assert!(config.trace);
    }

    #[test]
    fn test_parse_options_errors() {
        assert!(matches!(
            parse_options(&[("latency", "six")]),
            Err(SimError::InvalidParameter { key: "latency", .. })
        ));
        assert!(matches!(
            parse_options(&[("id0", "0x10000")]),
            Err(SimError::InvalidParameter { key: "id0", .. })
        ));
        assert!(matches!(
            parse_options(&[("colour", "blue")]),
            Err(SimError::UnknownParameter(_))
        ));
        assert!(matches!(
            parse_options(&[("wrap", "12")]),
            Err(SimError::WrapLength(12))
        ));
        assert!(matches!(
            parse_options(&[("size", "8")]),
            Err(SimError::MemoryTooSmall { size: 8, wrap: 16 })
        ));
    }

    #[test]
    fn test_register_read_after_latency() {
        let mut dev = SimHyperRam::new(SimConfig::default().with_trace(true)).unwrap();
        let ca = CommandAddress::new(
            Direction::Read,
            AddressSpace::Register,
            BurstType::Linear,
            RegisterId::Id0.ca_address(),
        );
        select_and_send_ca(&mut dev, ca);
        for _ in 0..DEFAULT_INITIAL_LATENCY {
            assert_eq!(dev.clock(None), None);
        }
        assert_eq!(dev.clock(None), Some([0x0C, 0x81]));
        dev.set_cs(false);

        assert_eq!(dev.windows(), 1);
        assert_eq!(dev.max_cs_low(), 3 + DEFAULT_INITIAL_LATENCY + 1);
        assert_eq!(dev.trace().len(), 1 + 3 + 7 + 1);
    }

    #[test]
    fn test_masked_write_keeps_bytes() {
        let mut dev = SimHyperRam::new(SimConfig::default()).unwrap();
        dev.load(4, &[0x1122]);
        let ca = CommandAddress::new(
            Direction::Write,
            AddressSpace::Memory,
            BurstType::Linear,
            4,
        );
        select_and_send_ca(&mut dev, ca);
        for _ in 0..DEFAULT_INITIAL_LATENCY {
            dev.clock(None);
        }
        dev.clock(Some([WireBeat { data: 0xAA, mask: 1 }, WireBeat::new(0xBB)]));
        dev.set_cs(false);
        assert_eq!(dev.memory()[4], 0x11BB);
    }

    #[test]
    fn test_id_registers_read_only() {
        let mut dev = SimHyperRam::new(SimConfig::default()).unwrap();
        let ca = CommandAddress::new(
            Direction::Write,
            AddressSpace::Register,
            BurstType::Linear,
            RegisterId::Id1.ca_address(),
        );
        select_and_send_ca(&mut dev, ca);
        dev.clock(Some([WireBeat::new(0xFF), WireBeat::new(0xFF)]));
        dev.set_cs(false);
        assert_eq!(dev.register(RegisterId::Id1), DEFAULT_ID1);
    }

    #[test]
    fn test_alternate_extra_latency() {
        let config = SimConfig::default().with_extra_latency(ExtraLatency::Alternate);
        let mut dev = SimHyperRam::new(config).unwrap();
        let mut levels = Vec::new();
        for _ in 0..3 {
            dev.set_cs(true);
            levels.push(dev.sample_rwds());
            dev.set_cs(false);
        }
        assert_eq!(levels, vec![Some(true), Some(false), Some(true)]);
        assert_eq!(dev.sample_rwds(), None);
    }

    #[test]
    fn test_tcsm_violation_counted_once_per_window() {
        let config = SimConfig {
            tcsm: 4,
            ..SimConfig::default()
        };
        let mut dev = SimHyperRam::new(config).unwrap();
        dev.set_cs(true);
        for _ in 0..8 {
            dev.idle();
        }
        dev.set_cs(false);
        assert_eq!(dev.tcsm_violations(), 1);
        assert_eq!(dev.max_cs_low(), 8);
    }
}

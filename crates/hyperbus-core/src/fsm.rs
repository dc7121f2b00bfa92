//! Protocol sequencer
//!
//! One [`Sequencer::step`] is one HyperBus clock cycle. The sequencer owns
//! the transaction from chip-select assertion until the result is posted and
//! never blocks; the bus adapter decides when to call it.
//!
//! ```text
//!  Idle -> AssertCs -> CaPhase -> LatencyWait -> DataPhase -> Recovery -> Idle
//!             ^                                                 |
//!             +------------- tCSM refresh (resume) -------------+
//! ```

use alloc::vec::Vec;

use crate::ca::{CommandAddress, CA_CYCLES};
use crate::config::TimingConfig;
use crate::error::Error;
use crate::latency::LatencyTracker;
use crate::phy::HyperBusPhy;
use crate::serdes::{self, Deserializer, WireBeat};
use crate::transaction::{
    AddressSpace, BurstType, Direction, TransactionRequest, TransferResult, TransferStatus,
};

/// Externally visible controller state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// No transaction on the bus
    Idle,
    /// CS# low, waiting out the setup time
    AssertCs,
    /// Sending the six CA bytes
    CaPhase,
    /// Counting initial (or doubled) latency
    LatencyWait,
    /// Transferring burst words
    DataPhase,
    /// CS# high, waiting out the recovery time
    Recovery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    AssertCs { remaining: u32 },
    CaPhase { cycle: u32 },
    LatencyWait { elapsed: u32 },
    DataPhase,
    Recovery { remaining: u32, resume: bool },
}

/// Book-keeping for the transaction on the bus
struct Transfer {
    request: TransactionRequest,
    ca: CommandAddress,
    /// Pre-serialized write beats
    beats: Vec<WireBeat>,
    cursor: usize,
    rx: Deserializer,
    words_done: usize,
    tracker: LatencyTracker,
    skip_latency: bool,
    cs_asserted: bool,
    cs_low: u32,
    stalled: u32,
    refreshes: u16,
    cycles: u32,
    fault: Option<Error>,
}

impl Transfer {
    fn new(request: TransactionRequest, ca: CommandAddress, config: &TimingConfig) -> Self {
        let width = config.bus_width();
        let beats = match request.direction() {
            Direction::Write => serdes::serialize(request.payload(), request.mask(), width),
            Direction::Read => Vec::new(),
        };
        let skip_latency = config.zero_latency_register_writes()
            && request.is_write()
            && request.space() == AddressSpace::Register;

        Self {
            request,
            ca,
            beats,
            cursor: 0,
            rx: Deserializer::new(width),
            words_done: 0,
            tracker: LatencyTracker::new(config),
            skip_latency,
            cs_asserted: false,
            cs_low: 0,
            stalled: 0,
            refreshes: 0,
            cycles: 0,
            fault: None,
        }
    }

    fn burst_len(&self) -> usize {
        usize::from(self.request.burst_len())
    }

    /// First phase of a chip-select window
    fn window_phase(config: &TimingConfig) -> Phase {
        if config.cs_setup() > 0 {
            Phase::AssertCs {
                remaining: config.cs_setup(),
            }
        } else {
            Phase::CaPhase { cycle: 0 }
        }
    }

    /// Account for one CS-low cycle, asserting CS# on the first
    fn hold_cs<P: HyperBusPhy + ?Sized>(&mut self, phy: &mut P, config: &TimingConfig) {
        if !self.cs_asserted {
            phy.set_cs(true);
            self.cs_asserted = true;
        }
        self.cs_low += 1;
        debug_assert!(self.cs_low <= config.tcsm(), "tCSM exceeded");
    }

    fn release_cs<P: HyperBusPhy + ?Sized>(&mut self, phy: &mut P) {
        if self.cs_asserted {
            phy.set_cs(false);
            self.cs_asserted = false;
        }
    }

    /// Take the RWDS sample if this CA-relative cycle is the sampling point
    fn sample_rwds<P: HyperBusPhy + ?Sized>(&mut self, phy: &mut P, cycle: u32) {
        if self.skip_latency || !self.tracker.sample_due(cycle) {
            return;
        }
        let level = phy.sample_rwds();
        match self.tracker.sample(cycle, level) {
            Ok(latency) => log::trace!("hyperbus: RWDS {:?}, latency {}", level, latency),
            Err(e) => {
                log::warn!(
                    "hyperbus: RWDS latency sample fault at cycle {} (level {:?}): {}",
                    cycle,
                    level,
                    e
                );
                self.fault = Some(e);
            }
        }
    }

    /// Address the device should continue from after a forced recovery
    fn resume_address(&self, wrap_words: u16) -> u32 {
        let start = self.request.address();
        let done = self.words_done as u32;
        match self.request.burst_type() {
            BurstType::Linear => start.wrapping_add(done),
            BurstType::Wrapped => {
                let wrap = u32::from(wrap_words);
                let base = start & !(wrap - 1);
                base | ((start - base).wrapping_add(done) % wrap)
            }
        }
    }

    /// Re-open chip select after a tCSM recovery
    fn reopen(&mut self, config: &TimingConfig) -> Phase {
        let address = self.resume_address(config.wrap_words());
        self.ca = self.ca.with_address(address);
        self.tracker = LatencyTracker::new(config);
        self.cs_low = 0;
        self.refreshes = self.refreshes.saturating_add(1);
        log::debug!(
            "hyperbus: tCSM refresh after {} of {} words, resuming at 0x{:08X}",
            self.words_done,
            self.burst_len(),
            address
        );
        Self::window_phase(config)
    }

    /// One data-phase cycle; returns true if words moved
    fn transfer_cycle<P: HyperBusPhy + ?Sized>(
        &mut self,
        phy: &mut P,
        config: &TimingConfig,
    ) -> bool {
        let per_cycle = config.bus_width().words_per_cycle();
        match self.request.direction() {
            Direction::Write => {
                let pair = [self.beats[self.cursor], self.beats[self.cursor + 1]];
                phy.clock(Some(pair));
                self.cursor += 2;
                self.words_done = (self.words_done + per_cycle).min(self.burst_len());
                true
            }
            Direction::Read => match phy.clock(None) {
                Some([first, second]) => {
                    self.rx.push(first);
                    self.rx.push(second);
                    self.rx.truncate(self.burst_len());
                    self.words_done = self.rx.len();
                    true
                }
                None => false,
            },
        }
    }

    fn into_result(self) -> TransferResult {
        let status = match self.fault {
            None => TransferStatus::Completed,
            Some(Error::TimedOut) => TransferStatus::TimedOut,
            Some(_) => TransferStatus::Aborted,
        };
        TransferResult {
            status,
            data: self.rx.into_words(),
            fault: self.fault,
            cycles: self.cycles,
            refreshes: self.refreshes,
        }
    }
}

/// Cycle-accurate HyperBus sequencer
pub(crate) struct Sequencer {
    config: TimingConfig,
    phase: Phase,
    transfer: Option<Transfer>,
}

impl Sequencer {
    pub(crate) fn new(config: TimingConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            transfer: None,
        }
    }

    pub(crate) fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> State {
        match self.phase {
            Phase::Idle => State::Idle,
            Phase::AssertCs { .. } => State::AssertCs,
            Phase::CaPhase { .. } => State::CaPhase,
            Phase::LatencyWait { .. } => State::LatencyWait,
            Phase::DataPhase => State::DataPhase,
            Phase::Recovery { .. } => State::Recovery,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.transfer.is_none()
    }

    /// Hand a validated request to the sequencer; takes effect on the next step
    pub(crate) fn load(&mut self, request: TransactionRequest, ca: CommandAddress) {
        debug_assert!(self.is_idle());
        log::debug!(
            "hyperbus: {:?} {:?} 0x{:08X} x{} CA {:?}",
            request.direction(),
            request.space(),
            request.address(),
            request.burst_len(),
            ca
        );
        self.transfer = Some(Transfer::new(request, ca, &self.config));
    }

    /// Advance one clock cycle; returns the result when the transaction ends
    pub(crate) fn step<P: HyperBusPhy + ?Sized>(&mut self, phy: &mut P) -> Option<TransferResult> {
        let config = &self.config;
        let Some(t) = self.transfer.as_mut() else {
            phy.idle();
            return None;
        };
        t.cycles = t.cycles.saturating_add(1);

        // Picking up a loaded request takes no time of its own
        let phase = match self.phase {
            Phase::Idle => Transfer::window_phase(config),
            other => other,
        };
        let recovery = Phase::Recovery {
            remaining: config.cs_hold(),
            resume: false,
        };

        let next = match phase {
            Phase::Idle => {
                phy.idle();
                Phase::Idle
            }
            Phase::AssertCs { remaining } => {
                t.hold_cs(phy, config);
                phy.idle();
                if remaining > 1 {
                    Phase::AssertCs {
                        remaining: remaining - 1,
                    }
                } else {
                    Phase::CaPhase { cycle: 0 }
                }
            }
            Phase::CaPhase { cycle } => {
                t.hold_cs(phy, config);
                t.sample_rwds(phy, cycle);
                let bytes = t.ca.to_bytes();
                let i = cycle as usize * 2;
                phy.clock(Some([
                    WireBeat::new(u16::from(bytes[i])),
                    WireBeat::new(u16::from(bytes[i + 1])),
                ]));

                if t.fault.is_some() {
                    recovery
                } else if cycle + 1 < CA_CYCLES {
                    Phase::CaPhase { cycle: cycle + 1 }
                } else if t.skip_latency {
                    Phase::DataPhase
                } else {
                    Phase::LatencyWait { elapsed: 0 }
                }
            }
            Phase::LatencyWait { elapsed } => {
                t.hold_cs(phy, config);
                t.sample_rwds(phy, CA_CYCLES + elapsed);
                phy.clock(None);

                let elapsed = elapsed + 1;
                match t.tracker.wait_done(elapsed) {
                    _ if t.fault.is_some() => recovery,
                    Ok(true) => Phase::DataPhase,
                    Ok(false) => Phase::LatencyWait { elapsed },
                    Err(e) => {
                        log::warn!("hyperbus: latency wait ended without RWDS sample");
                        t.fault = Some(e);
                        recovery
                    }
                }
            }
            Phase::DataPhase => {
                t.hold_cs(phy, config);
                if t.transfer_cycle(phy, config) {
                    t.stalled = 0;
                } else {
                    t.stalled += 1;
                    if t.stalled > config.watchdog() {
                        log::warn!(
                            "hyperbus: no read strobe for {} cycles after {} words",
                            t.stalled,
                            t.words_done
                        );
                        t.fault = Some(Error::TimedOut);
                    }
                }

                if t.fault.is_some() || t.words_done >= t.burst_len() {
                    recovery
                } else if t.cs_low >= config.tcsm() {
                    Phase::Recovery {
                        remaining: config.cs_hold(),
                        resume: true,
                    }
                } else {
                    Phase::DataPhase
                }
            }
            Phase::Recovery { remaining, resume } => {
                t.release_cs(phy);
                phy.idle();
                if remaining > 1 {
                    Phase::Recovery {
                        remaining: remaining - 1,
                        resume,
                    }
                } else if resume {
                    t.reopen(config)
                } else {
                    Phase::Idle
                }
            }
        };

        log::trace!("hyperbus: {:?} -> {:?}", phase, next);
        self.phase = next;
        if next != Phase::Idle {
            return None;
        }

        let result = self.transfer.take()?.into_result();
        log::debug!(
            "hyperbus: {:?} after {} cycles ({} refreshes)",
            result.status,
            result.cycles,
            result.refreshes
        );
        Some(result)
    }
}

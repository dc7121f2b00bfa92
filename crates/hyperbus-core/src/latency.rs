//! Latency resolution
//!
//! In variable-latency mode the device drives RWDS high during the CA phase
//! when it needs a second initial-latency period (for example because a
//! refresh is in progress). The controller looks at RWDS exactly once per
//! chip-select window, at a fixed cycle offset.

use crate::config::TimingConfig;
use crate::error::{Error, Result};

/// Latency wait in cycles for a given RWDS sample
pub fn resolve_latency(config: &TimingConfig, sampled_extra_request: bool) -> u32 {
    if config.fixed_latency() || !sampled_extra_request {
        config.initial_latency()
    } else {
        config.initial_latency().saturating_mul(2)
    }
}

/// Single-sample RWDS tracker for one chip-select window
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    initial: u32,
    fixed: bool,
    sample_offset: u32,
    resolved: Option<u32>,
}

impl LatencyTracker {
    /// Start tracking a new chip-select window
    pub fn new(config: &TimingConfig) -> Self {
        let resolved = config
            .fixed_latency()
            .then_some(config.initial_latency());
        Self {
            initial: config.initial_latency(),
            fixed: config.fixed_latency(),
            sample_offset: config.sample_offset(),
            resolved,
        }
    }

    /// Returns true if RWDS must be sampled on this cycle
    ///
    /// `cycle` counts from the first CA cycle.
    pub fn sample_due(&self, cycle: u32) -> bool {
        self.resolved.is_none() && cycle == self.sample_offset
    }

    /// Record the RWDS sample taken on `cycle`
    ///
    /// `level` is `None` when the line was not driven. Sampling at any other
    /// cycle, sampling twice, or an undriven line is a protocol fault.
    pub fn sample(&mut self, cycle: u32, level: Option<bool>) -> Result<u32> {
        if self.fixed {
            return Ok(self.initial);
        }
        if self.resolved.is_some() || cycle != self.sample_offset {
            return Err(Error::LatencySampleFault);
        }

        let extra = level.ok_or(Error::LatencySampleFault)?;
        let cycles = if extra {
            self.initial.saturating_mul(2)
        } else {
            self.initial
        };
        self.resolved = Some(cycles);
        Ok(cycles)
    }

    /// Latency count once resolved
    pub fn resolved(&self) -> Option<u32> {
        self.resolved
    }

    /// Check whether `elapsed` latency cycles end the wait
    ///
    /// Reaching the initial latency without a sample means the sample was
    /// missed.
    pub fn wait_done(&self, elapsed: u32) -> Result<bool> {
        match self.resolved {
            Some(target) => Ok(elapsed >= target),
            None if elapsed >= self.initial => Err(Error::LatencySampleFault),
            None => Ok(false),
        }
    }
}

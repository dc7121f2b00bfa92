//! Logical PHY interface
//!
//! The controller never touches pads directly. Each call below is one clock
//! cycle (or one level change) that the physical layer turns into DDR flop
//! activity. Implementations include a pad driver on real hardware and the
//! simulated device in `hyperbus-sim`.

use crate::serdes::WireBeat;

/// Device-side signal interface driven by the controller
pub trait HyperBusPhy {
    /// Drive CS# (`asserted = true` means CS# low)
    fn set_cs(&mut self, asserted: bool);

    /// Spend one cycle with CK parked low (setup, recovery, idle)
    fn idle(&mut self);

    /// Run one CK cycle
    ///
    /// With `drive = Some`, DQ and RWDS are outputs and the two beats go out
    /// on the rising and falling edge. With `None` the controller releases DQ
    /// and returns the beats the device strobed with RWDS, or `None` if the
    /// device did not drive data this cycle.
    fn clock(&mut self, drive: Option<[WireBeat; 2]>) -> Option<[u16; 2]>;

    /// Read RWDS once for the latency decision
    ///
    /// Returns `None` if the device is not driving the line.
    fn sample_rwds(&mut self) -> Option<bool>;
}

impl<P: HyperBusPhy + ?Sized> HyperBusPhy for &mut P {
    fn set_cs(&mut self, asserted: bool) {
        (**self).set_cs(asserted)
    }

    fn idle(&mut self) {
        (**self).idle()
    }

    fn clock(&mut self, drive: Option<[WireBeat; 2]>) -> Option<[u16; 2]> {
        (**self).clock(drive)
    }

    fn sample_rwds(&mut self) -> Option<bool> {
        (**self).sample_rwds()
    }
}

impl HyperBusPhy for alloc::boxed::Box<dyn HyperBusPhy + Send> {
    fn set_cs(&mut self, asserted: bool) {
        (**self).set_cs(asserted)
    }

    fn idle(&mut self) {
        (**self).idle()
    }

    fn clock(&mut self, drive: Option<[WireBeat; 2]>) -> Option<[u16; 2]> {
        (**self).clock(drive)
    }

    fn sample_rwds(&mut self) -> Option<bool> {
        (**self).sample_rwds()
    }
}

/// Observable wire activity, one entry per PHY call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireEvent {
    /// CS# level change
    ChipSelect {
        /// CS# low
        asserted: bool,
    },
    /// Cycle with CK parked
    Idle,
    /// Controller-driven clock cycle
    Drive {
        /// Beats on the rising and falling edge
        beats: [WireBeat; 2],
    },
    /// Clock cycle with DQ released
    Receive {
        /// Beats strobed by the device, if any
        beats: Option<[u16; 2]>,
    },
    /// RWDS latency sample
    RwdsSample {
        /// Sampled level, `None` if undriven
        level: Option<bool>,
    },
}

impl core::fmt::Display for WireEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ChipSelect { asserted: true } => write!(f, "CS# low"),
            Self::ChipSelect { asserted: false } => write!(f, "CS# high"),
            Self::Idle => write!(f, "idle"),
            Self::Drive { beats } => write!(
                f,
                "out {:04X}/{:04X} rwds {}{}",
                beats[0].data, beats[1].data, beats[0].mask, beats[1].mask
            ),
            Self::Receive { beats: Some(b) } => write!(f, "in  {:04X}/{:04X}", b[0], b[1]),
            Self::Receive { beats: None } => write!(f, "in  --"),
            Self::RwdsSample { level: Some(l) } => write!(f, "rwds sample {}", u8::from(*l)),
            Self::RwdsSample { level: None } => write!(f, "rwds sample undriven"),
        }
    }
}

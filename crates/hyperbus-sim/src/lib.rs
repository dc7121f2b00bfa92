//! hyperbus-sim - Cycle-level simulated HyperRAM
//!
//! This crate provides [`SimHyperRam`], a HyperRAM model that implements the
//! [`HyperBusPhy`](hyperbus_core::phy::HyperBusPhy) interface. It lets the
//! controller run end to end without hardware: CA decoding, initial and
//! doubled latency, register space, wrapped bursts and byte masks behave like
//! the device, and the model keeps a wire trace plus chip-select timing
//! statistics for checking tCSM compliance.
//!
//! # Example
//!
//! ```no_run
//! use hyperbus_core::bus::HyperBusController;
//! use hyperbus_core::config::TimingConfig;
//! use hyperbus_core::transaction::{AddressSpace, TransactionRequest};
//! use hyperbus_sim::{SimConfig, SimHyperRam};
//!
//! let timing = TimingConfig::default();
//! let ram = SimHyperRam::new(SimConfig::matching(&timing))?;
//! let mut ctrl = HyperBusController::new(timing, ram);
//!
//! let handle = ctrl.submit(TransactionRequest::write(AddressSpace::Memory, 0x10, vec![0xAAAA]))?;
//! assert!(ctrl.run_until_complete(handle)?.is_completed());
//! assert_eq!(ctrl.phy().memory()[0x10], 0xAAAA);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the hyperbus CLI
//!
//! ```bash
//! # Device with doubled latency on every other access
//! hyperbus -d sim:extra=alternate,fixed=false read 0x0 16
//!
//! # Drop the first RWDS sample to exercise the abort path
//! hyperbus -d sim:drop-rwds=1,fixed=false info
//! ```

mod device;
mod error;

pub use device::{
    parse_options, ExtraLatency, SimConfig, SimHyperRam, DEFAULT_CR0, DEFAULT_CR1, DEFAULT_ID0,
    DEFAULT_ID1, DEFAULT_SIZE_WORDS,
};
pub use error::{Result, SimError};

//! hyperbus-core - HyperBus protocol controller
//!
//! This crate turns single memory-mapped bus transactions into the HyperBus
//! wire protocol used by HyperRAM and HyperFlash devices: chip-select framing,
//! the 48-bit command/address phase, fixed or RWDS-extended latency, and the
//! double-data-rate data phase. It is `no_std` (with `alloc`) so the same
//! sequencer can run on a microcontroller driving pads, or on a host against
//! a simulated device.
//!
//! # Features
//!
//! - `std` - Enable `std::error::Error` impls and RON timing files
//!
//! # Example
//!
//! ```ignore
//! use hyperbus_core::{bus::HyperBusController, config::TimingParams};
//! use hyperbus_core::transaction::{AddressSpace, TransactionRequest};
//!
//! let params = TimingParams::default().with_initial_latency(6);
//! let mut ctrl = HyperBusController::with_params(params, phy)?;
//! let handle = ctrl.submit(TransactionRequest::read(AddressSpace::Memory, 0x10, 4))?;
//! let result = ctrl.run_until_complete(handle)?;
//! println!("{:04X?}", result.data);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod ca;
pub mod config;
pub mod error;
mod fsm;
pub mod latency;
pub mod phy;
pub mod serdes;
pub mod transaction;

pub use error::{ConfigFault, Error, Result};
pub use fsm::State;

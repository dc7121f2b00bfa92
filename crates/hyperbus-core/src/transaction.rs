//! Bus-side transaction types
//!
//! A [`TransactionRequest`] is what the system-bus front end hands to the
//! controller; a [`TransferResult`] is what it gets back.

use alloc::vec::Vec;
use bitflags::bitflags;

use crate::error::Error;

/// Transfer direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to controller
    #[default]
    Read,
    /// Controller to device
    Write,
}

/// Target address space on the device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    /// Memory array
    #[default]
    Memory,
    /// Identification and configuration registers
    Register,
}

/// Burst addressing mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BurstType {
    /// Sequential addresses across the whole array
    #[default]
    Linear,
    /// Addresses wrap inside an aligned group (cache-line fills)
    Wrapped,
}

bitflags! {
    /// Byte enables for one 16-bit word
    ///
    /// A cleared bit is sent as a masked byte (RWDS high) during writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ByteEnable: u8 {
        /// Bits 7..0
        const LOW  = 1 << 0;
        /// Bits 15..8
        const HIGH = 1 << 1;

        /// Both bytes written
        const WORD = Self::LOW.bits() | Self::HIGH.bits();
    }
}

impl Default for ByteEnable {
    fn default() -> Self {
        ByteEnable::WORD
    }
}

/// A single bus transaction
///
/// Fields are private: a request is immutable once built and is consumed
/// by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    space: AddressSpace,
    direction: Direction,
    address: u32,
    payload: Vec<u16>,
    mask: Vec<ByteEnable>,
    burst_len: u16,
    burst_type: BurstType,
}

impl TransactionRequest {
    /// Create a read of `burst_len` words starting at `address`
    pub fn read(space: AddressSpace, address: u32, burst_len: u16) -> Self {
        Self {
            space,
            direction: Direction::Read,
            address,
            payload: Vec::new(),
            mask: Vec::new(),
            burst_len,
            burst_type: BurstType::Linear,
        }
    }

    /// Create a write of `payload` starting at `address`
    ///
    /// The burst length is the payload length (saturated at `u16::MAX`
    /// words; longer payloads are rejected on submit).
    pub fn write(space: AddressSpace, address: u32, payload: Vec<u16>) -> Self {
        let burst_len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
        Self {
            space,
            direction: Direction::Write,
            address,
            payload,
            mask: Vec::new(),
            burst_len,
            burst_type: BurstType::Linear,
        }
    }

    /// Attach per-word byte enables to a write
    pub fn with_mask(mut self, mask: Vec<ByteEnable>) -> Self {
        self.mask = mask;
        self
    }

    /// Set the burst addressing mode
    pub fn with_burst_type(mut self, burst_type: BurstType) -> Self {
        self.burst_type = burst_type;
        self
    }

    /// Address space
    pub fn space(&self) -> AddressSpace {
        self.space
    }

    /// Transfer direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Word address (register index for register space)
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Write payload (empty for reads)
    pub fn payload(&self) -> &[u16] {
        &self.payload
    }

    /// Byte enables (empty means every byte enabled)
    pub fn mask(&self) -> &[ByteEnable] {
        &self.mask
    }

    /// Number of words transferred
    pub fn burst_len(&self) -> u16 {
        self.burst_len
    }

    /// Burst addressing mode
    pub fn burst_type(&self) -> BurstType {
        self.burst_type
    }

    /// Returns true for writes
    pub fn is_write(&self) -> bool {
        self.direction == Direction::Write
    }

    /// Check the burst framing of this request
    ///
    /// Address range checks are done by the CA encoder.
    pub fn check_burst(&self) -> Result<(), Error> {
        if self.burst_len == 0 {
            return Err(Error::InvalidBurst);
        }
        if self.space == AddressSpace::Register && self.burst_len != 1 {
            return Err(Error::InvalidBurst);
        }
        match self.direction {
            Direction::Read => {
                if !self.payload.is_empty() || !self.mask.is_empty() {
                    return Err(Error::InvalidBurst);
                }
            }
            Direction::Write => {
                if self.payload.len() != usize::from(self.burst_len) {
                    return Err(Error::InvalidBurst);
                }
                if !self.mask.is_empty() && self.mask.len() != self.payload.len() {
                    return Err(Error::InvalidBurst);
                }
            }
        }
        Ok(())
    }
}

/// Final outcome of a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    /// All words transferred
    Completed,
    /// Aborted by a protocol fault (see `TransferResult::fault`)
    Aborted,
    /// Watchdog expired waiting for data
    TimedOut,
}

/// Result posted once per transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Outcome
    pub status: TransferStatus,
    /// Words read, in order (empty for writes)
    pub data: Vec<u16>,
    /// Fault that ended the transaction early
    pub fault: Option<Error>,
    /// Clock cycles from pick-up to result
    pub cycles: u32,
    /// Forced chip-select recoveries caused by tCSM
    pub refreshes: u16,
}

impl TransferResult {
    /// Returns true if every word was transferred
    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_write_burst_follows_payload() {
        let req = TransactionRequest::write(AddressSpace::Memory, 0x10, vec![1, 2, 3]);
        assert_eq!(req.burst_len(), 3);
        assert!(req.is_write());
        assert_eq!(req.check_burst(), Ok(()));
    }

    #[test]
    fn test_zero_burst_rejected() {
        let req = TransactionRequest::read(AddressSpace::Memory, 0, 0);
        assert_eq!(req.check_burst(), Err(Error::InvalidBurst));
    }

    #[test]
    fn test_mask_length_must_match() {
        let req = TransactionRequest::write(AddressSpace::Memory, 0, vec![1, 2])
            .with_mask(vec![ByteEnable::LOW]);
        assert_eq!(req.check_burst(), Err(Error::InvalidBurst));
    }

    #[test]
    fn test_register_burst_is_single_word() {
        let req = TransactionRequest::read(AddressSpace::Register, 0, 2);
        assert_eq!(req.check_burst(), Err(Error::InvalidBurst));
        let req = TransactionRequest::read(AddressSpace::Register, 0, 1);
        assert_eq!(req.check_burst(), Ok(()));
    }
}

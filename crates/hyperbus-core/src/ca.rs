//! Command/Address word
//!
//! The CA phase is six bytes on DQ[7:0], most significant byte first:
//!
//! | Bits  | Field |
//! |-------|-------|
//! | 47    | R/W# (1 = read) |
//! | 46    | Address space (1 = register) |
//! | 45    | Burst type (1 = linear) |
//! | 44-16 | Row and upper column address (word address bits 31-3) |
//! | 15-3  | Reserved |
//! | 2-0   | Lower column address (word address bits 2-0) |

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::transaction::{AddressSpace, BurstType, Direction, TransactionRequest};

/// Number of CA bytes on the wire
pub const CA_BEATS: usize = 6;

/// Clock cycles taken by the CA phase (two beats per cycle)
pub const CA_CYCLES: u32 = (CA_BEATS / 2) as u32;

const UPPER_SHIFT: u32 = 16;
const UPPER_MASK: u64 = 0x1FFF_FFFF;
const LOWER_MASK: u64 = 0x7;
const WORD_MASK: u64 = (1 << 48) - 1;

bitflags! {
    /// Control bits of the CA word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CaFlags: u64 {
        /// Read transaction
        const READ           = 1 << 47;
        /// Register address space
        const REGISTER_SPACE = 1 << 46;
        /// Linear burst
        const LINEAR_BURST   = 1 << 45;
    }
}

/// Device registers reachable in register space
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterId {
    /// Identification register 0 (read only)
    Id0,
    /// Identification register 1 (read only)
    Id1,
    /// Configuration register 0
    Cr0,
    /// Configuration register 1
    Cr1,
}

impl RegisterId {
    /// All registers, in request-index order
    pub const ALL: [RegisterId; 4] = [Self::Id0, Self::Id1, Self::Cr0, Self::Cr1];

    /// Look up a register by request index
    pub fn from_index(index: u32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Request index of this register
    pub const fn index(&self) -> u32 {
        match self {
            Self::Id0 => 0,
            Self::Id1 => 1,
            Self::Cr0 => 2,
            Self::Cr1 => 3,
        }
    }

    /// Word address carried in the CA phase
    pub const fn ca_address(&self) -> u32 {
        match self {
            Self::Id0 => 0x0000_0000,
            Self::Id1 => 0x0000_0001,
            Self::Cr0 => 0x0000_0800,
            Self::Cr1 => 0x0000_0801,
        }
    }

    /// Look up a register by its CA address
    pub fn from_ca_address(address: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.ca_address() == address)
    }

    /// Returns true if the register accepts writes
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::Cr0 | Self::Cr1)
    }

    /// Short register name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Id0 => "ID0",
            Self::Id1 => "ID1",
            Self::Cr0 => "CR0",
            Self::Cr1 => "CR1",
        }
    }
}

/// Fields recovered from a CA word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedCa {
    /// Transfer direction
    pub direction: Direction,
    /// Address space
    pub space: AddressSpace,
    /// Burst type
    pub burst_type: BurstType,
    /// Request address (register index for register space)
    pub address: u32,
}

/// A 48-bit command/address word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandAddress(u64);

impl CommandAddress {
    /// Build a CA word from its fields
    ///
    /// `address` is the device word address (for register space, the
    /// register's CA address).
    pub fn new(
        direction: Direction,
        space: AddressSpace,
        burst_type: BurstType,
        address: u32,
    ) -> Self {
        let mut flags = CaFlags::empty();
        if direction == Direction::Read {
            flags |= CaFlags::READ;
        }
        if space == AddressSpace::Register {
            flags |= CaFlags::REGISTER_SPACE;
        }
        if burst_type == BurstType::Linear {
            flags |= CaFlags::LINEAR_BURST;
        }

        let address = u64::from(address);
        let upper = (address >> 3) & UPPER_MASK;
        let lower = address & LOWER_MASK;
        Self(flags.bits() | (upper << UPPER_SHIFT) | lower)
    }

    /// Build from the raw 48-bit value (upper bits are dropped)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw & WORD_MASK)
    }

    /// Raw 48-bit value
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Reassemble from the six wire bytes
    pub fn from_bytes(bytes: [u8; CA_BEATS]) -> Self {
        let raw = bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        Self(raw)
    }

    /// The six wire bytes, most significant first
    pub fn to_bytes(&self) -> [u8; CA_BEATS] {
        let mut out = [0u8; CA_BEATS];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = (self.0 >> (40 - 8 * i)) as u8;
        }
        out
    }

    /// Control flags
    pub fn flags(&self) -> CaFlags {
        CaFlags::from_bits_truncate(self.0)
    }

    /// Transfer direction
    pub fn direction(&self) -> Direction {
        if self.flags().contains(CaFlags::READ) {
            Direction::Read
        } else {
            Direction::Write
        }
    }

    /// Address space
    pub fn space(&self) -> AddressSpace {
        if self.flags().contains(CaFlags::REGISTER_SPACE) {
            AddressSpace::Register
        } else {
            AddressSpace::Memory
        }
    }

    /// Burst type
    pub fn burst_type(&self) -> BurstType {
        if self.flags().contains(CaFlags::LINEAR_BURST) {
            BurstType::Linear
        } else {
            BurstType::Wrapped
        }
    }

    /// Returns true for write transactions
    pub fn is_write(&self) -> bool {
        self.direction() == Direction::Write
    }

    /// Returns true for memory-space transactions
    pub fn is_memory_space(&self) -> bool {
        self.space() == AddressSpace::Memory
    }

    /// Device word address carried by the upper and lower fields
    pub fn address(&self) -> u32 {
        let upper = (self.0 >> UPPER_SHIFT) & UPPER_MASK;
        let lower = self.0 & LOWER_MASK;
        ((upper << 3) | lower) as u32
    }

    /// Same command, different address
    pub fn with_address(&self, address: u32) -> Self {
        Self::new(self.direction(), self.space(), self.burst_type(), address)
    }
}

impl core::fmt::Debug for CommandAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CommandAddress({:012X})", self.0)
    }
}

/// Encode a request into its CA word
///
/// Memory addresses map straight onto the upper/lower fields. Register
/// addresses are indices selecting [`RegisterId`]; anything beyond the last
/// register is rejected.
pub fn encode(request: &TransactionRequest) -> Result<CommandAddress> {
    let address = match request.space() {
        AddressSpace::Memory => request.address(),
        AddressSpace::Register => RegisterId::from_index(request.address())
            .ok_or(Error::InvalidAddress)?
            .ca_address(),
    };

    Ok(CommandAddress::new(
        request.direction(),
        request.space(),
        request.burst_type(),
        address,
    ))
}

/// Recover the request fields from a CA word
pub fn decode(ca: &CommandAddress) -> Result<DecodedCa> {
    let space = ca.space();
    let address = match space {
        AddressSpace::Memory => ca.address(),
        AddressSpace::Register => RegisterId::from_ca_address(ca.address())
            .ok_or(Error::InvalidAddress)?
            .index(),
    };

    Ok(DecodedCa {
        direction: ca.direction(),
        space,
        burst_type: ca.burst_type(),
        address,
    })
}

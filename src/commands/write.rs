//! Write command implementation

use super::{progress_bar, read_words_file, transfer};
use crate::cli::BurstArgs;
use hyperbus_core::bus::HyperBusController;
use hyperbus_core::phy::HyperBusPhy;
use hyperbus_core::transaction::{AddressSpace, BurstType, TransactionRequest};
use std::path::Path;

/// Run the write command
pub fn run_write<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
    address: u32,
    data: Vec<u16>,
    input: Option<&Path>,
    register: bool,
    burst: &BurstArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let words = match input {
        Some(path) => read_words_file(path)?,
        None => data,
    };
    if words.is_empty() {
        return Err("Nothing to write".into());
    }

    if register {
        if words.len() != 1 {
            return Err("Register writes transfer exactly one word".into());
        }
        transfer(
            ctrl,
            TransactionRequest::write(AddressSpace::Register, address, words),
        )?;
        println!("Register {} written", address);
        return Ok(());
    }

    write_words(ctrl, address, &words, burst)?;
    println!("Wrote {} words at 0x{:08X}", words.len(), address);
    Ok(())
}

/// Write `words` to memory starting at `address` with progress bar
pub fn write_words<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
    address: u32,
    words: &[u16],
    burst: &BurstArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if burst.burst == 0 {
        return Err("Burst length must be at least one word".into());
    }
    let burst_type = if burst.wrapped {
        BurstType::Wrapped
    } else {
        BurstType::Linear
    };

    let pb = progress_bar(words.len(), burst.burst, "Writing")?;
    let mut offset = 0usize;
    for chunk in words.chunks(usize::from(burst.burst)) {
        let start = address.wrapping_add(offset as u32);
        let request = TransactionRequest::write(AddressSpace::Memory, start, chunk.to_vec())
            .with_burst_type(burst_type);
        transfer(ctrl, request)?;
        offset += chunk.len();
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Write complete");
    Ok(())
}

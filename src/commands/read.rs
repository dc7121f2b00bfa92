//! Read command implementation

use super::{print_words, progress_bar, transfer, write_words_file};
use crate::cli::BurstArgs;
use hyperbus_core::bus::HyperBusController;
use hyperbus_core::phy::HyperBusPhy;
use hyperbus_core::transaction::{AddressSpace, BurstType, TransactionRequest};
use std::path::Path;

/// Run the read command
pub fn run_read<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
    address: u32,
    count: u32,
    register: bool,
    output: Option<&Path>,
    burst: &BurstArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let words = if register {
        if count != 1 {
            return Err("Register reads transfer exactly one word".into());
        }
        transfer(
            ctrl,
            TransactionRequest::read(AddressSpace::Register, address, 1),
        )?
    } else {
        read_words(ctrl, address, count as usize, burst)?
    };

    match output {
        Some(path) => {
            write_words_file(path, &words)?;
            println!("Wrote {} words to {:?}", words.len(), path);
        }
        None => print_words(address, &words),
    }
    Ok(())
}

/// Read `count` memory words starting at `address` with progress bar
pub fn read_words<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
    address: u32,
    count: usize,
    burst: &BurstArgs,
) -> Result<Vec<u16>, Box<dyn std::error::Error>> {
    if burst.burst == 0 {
        return Err("Burst length must be at least one word".into());
    }
    let burst_type = if burst.wrapped {
        BurstType::Wrapped
    } else {
        BurstType::Linear
    };

    let pb = progress_bar(count, burst.burst, "Reading")?;
    let mut data = Vec::with_capacity(count);
    while data.len() < count {
        let len = (count - data.len()).min(usize::from(burst.burst)) as u16;
        let start = address.wrapping_add(data.len() as u32);
        let request =
            TransactionRequest::read(AddressSpace::Memory, start, len).with_burst_type(burst_type);
        data.extend(transfer(ctrl, request)?);
        pb.set_position(data.len() as u64);
    }

    pb.finish_with_message("Read complete");
    Ok(data)
}

//! CLI command implementations
//!
//! Every command talks to the device through the same
//! [`HyperBusController`]; long transfers are split into bursts of at most
//! `--burst` words and shown with a progress bar.

mod info;
mod read;
mod verify;
mod write;

pub use info::run_info;
pub use read::run_read;
pub use verify::run_verify;
pub use write::run_write;

use hyperbus_core::bus::HyperBusController;
use hyperbus_core::phy::{HyperBusPhy, WireEvent};
use hyperbus_core::transaction::{TransactionRequest, TransferStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

/// Run one request to completion, turning bus faults into errors
pub fn transfer<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
    request: TransactionRequest,
) -> Result<Vec<u16>, Box<dyn std::error::Error>> {
    let address = request.address();
    let handle = ctrl.submit(request)?;
    let result = ctrl.run_until_complete(handle)?;

    match result.status {
        TransferStatus::Completed => {
            if result.refreshes > 0 {
                log::debug!(
                    "Burst at 0x{:08X} needed {} tCSM refreshes",
                    address,
                    result.refreshes
                );
            }
            Ok(result.data)
        }
        status => {
            let fault = result.fault.map(|f| f.to_string()).unwrap_or_default();
            Err(format!(
                "Transaction at 0x{:08X} {:?} after {} cycles: {}",
                address, status, result.cycles, fault
            )
            .into())
        }
    }
}

/// Progress bar for multi-burst transfers, hidden for a single burst
pub fn progress_bar(
    words: usize,
    burst: u16,
    action: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    if words <= usize::from(burst) {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(words as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} words ({{per_sec}}, {{eta}}) {}",
                action
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Load a file of little-endian words; a trailing odd byte is zero-extended
pub fn read_words_file(path: &Path) -> Result<Vec<u16>, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let words: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    log::info!("Read {} words from {:?}", words.len(), path);
    Ok(words)
}

/// Save words as little-endian bytes
pub fn write_words_file(path: &Path, words: &[u16]) -> Result<(), Box<dyn std::error::Error>> {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(path, bytes)?;
    Ok(())
}

/// Print a wire trace, one event per line
pub fn print_trace(events: &[WireEvent]) {
    for (i, event) in events.iter().enumerate() {
        println!("{:6}  {}", i, event);
    }
}

/// Print words as a hex dump, eight per line
pub fn print_words(address: u32, words: &[u16]) {
    for (i, line) in words.chunks(8).enumerate() {
        let text: Vec<String> = line.iter().map(|w| format!("{:04X}", w)).collect();
        println!(
            "{:08X}: {}",
            address.wrapping_add((i * 8) as u32),
            text.join(" ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_file_round_trip() {
        let path = std::env::temp_dir().join(format!("hyperbus-words-{}.bin", std::process::id()));
        write_words_file(&path, &[0x1234, 0xABCD]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x34, 0x12, 0xCD, 0xAB]);

        fs::write(&path, [0x01, 0x02, 0x03]).unwrap();
        assert_eq!(read_words_file(&path).unwrap(), vec![0x0201, 0x0003]);
        fs::remove_file(&path).unwrap();
    }
}

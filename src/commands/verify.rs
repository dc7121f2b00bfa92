//! Verify command implementation

use super::read::read_words;
use super::read_words_file;
use super::write::write_words;
use crate::cli::BurstArgs;
use hyperbus_core::bus::HyperBusController;
use hyperbus_core::phy::HyperBusPhy;
use std::path::Path;

/// Run the verify command: write the file, read it back, compare
pub fn run_verify<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
    address: u32,
    input: &Path,
    burst: &BurstArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let expected = read_words_file(input)?;
    if expected.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }

    write_words(ctrl, address, &expected, burst)?;
    let actual = read_words(ctrl, address, expected.len(), burst)?;

    let mismatches = compare(&expected, &actual);
    if let Some(&(index, want, got)) = mismatches.first() {
        return Err(format!(
            "Verification failed: {} mismatched words, first at 0x{:08X} (expected {:04X}, got {:04X})",
            mismatches.len(),
            address.wrapping_add(index as u32),
            want,
            got
        )
        .into());
    }

    println!("Verification passed! ({} words)", expected.len());
    Ok(())
}

/// Positions where `actual` differs from `expected`
fn compare(expected: &[u16], actual: &[u16]) -> Vec<(usize, u16, u16)> {
    expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (want, got))| want != got)
        .map(|(i, (&want, &got))| (i, want, got))
        .collect()
}

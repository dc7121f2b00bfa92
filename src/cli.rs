//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a data word; always hex, with or without the 0x prefix
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("Invalid data word '{}': {}", s, e))
}

#[derive(Parser)]
#[command(name = "hyperbus")]
#[command(author, version, about = "HyperBus controller harness", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Timing configuration file (RON format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Device to drive, with options [available: sim]
    /// e.g. sim:extra=alternate,fixed=false
    #[arg(short, long, global = true, default_value = "sim")]
    pub device: String,

    /// Print every wire event after the command
    #[arg(long, global = true)]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Burst options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct BurstArgs {
    /// Maximum words per bus transaction
    #[arg(long, default_value = "64")]
    pub burst: u16,

    /// Use wrapped bursts instead of linear ones
    #[arg(long)]
    pub wrapped: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read words from memory or a register
    Read {
        /// Word address, or register index with --register (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Number of words to read (hex or decimal)
        #[arg(value_parser = parse_hex_u32, default_value = "1")]
        count: u32,

        /// Access register space (0=ID0, 1=ID1, 2=CR0, 3=CR1)
        #[arg(short, long)]
        register: bool,

        /// Save the words to a file (little-endian) instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        burst: BurstArgs,
    },

    /// Write words to memory or a register
    Write {
        /// Word address, or register index with --register (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Data words in hex (comma-separated)
        #[arg(value_delimiter = ',', value_parser = parse_hex_u16, required_unless_present = "input")]
        data: Vec<u16>,

        /// Take the words from a file (little-endian) instead
        #[arg(short, long, conflicts_with = "data")]
        input: Option<PathBuf>,

        /// Access register space (0=ID0, 1=ID1, 2=CR0, 3=CR1)
        #[arg(short, long)]
        register: bool,

        #[command(flatten)]
        burst: BurstArgs,
    },

    /// Write a file to memory and read it back
    Verify {
        /// Word address (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Input file (little-endian words)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        burst: BurstArgs,
    },

    /// Show the device identification and configuration registers
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_hex_u32("0x10"), Ok(0x10));
        assert_eq!(parse_hex_u32("16"), Ok(16));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert_eq!(parse_hex_u16("AAAA"), Ok(0xAAAA));
        assert_eq!(parse_hex_u16("0xbbbb"), Ok(0xBBBB));
        assert!(parse_hex_u16("10000").is_err());
    }

    #[test]
    fn test_write_command_line() {
        let cli = Cli::try_parse_from([
            "hyperbus",
            "-d",
            "sim:latency=7",
            "write",
            "0x10",
            "AAAA,BBBB",
        ])
        .unwrap();
        assert_eq!(cli.device, "sim:latency=7");
        match cli.command {
            Commands::Write { address, data, .. } => {
                assert_eq!(address, 0x10);
                assert_eq!(data, vec![0xAAAA, 0xBBBB]);
            }
            _ => panic!("expected write"),
        }
    }
}

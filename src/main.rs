//! hyperbus - HyperBus controller harness
//!
//! Drives the cycle-accurate HyperBus controller from the command line.
//!
//! # Architecture
//!
//! Every command goes through one `HyperBusController`:
//! - **Timing** comes from a RON file (`--config`) or the built-in defaults,
//!   and is validated once before anything touches the bus
//! - **Devices** are selected with `-d name:key=value,...`; the simulated
//!   HyperRAM is matched to the controller timing and takes fault-injection
//!   options on top
//!
//! With `--trace` the complete wire activity is printed after the command.

mod cli;
mod commands;
mod device;

use clap::Parser;
use cli::{Cli, Commands};
use hyperbus_core::bus::HyperBusController;
use hyperbus_core::config::TimingConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let timing = match &cli.config {
        Some(path) => {
            let timing = TimingConfig::load(path)?;
            log::info!("Loaded timing from {:?}", path);
            timing
        }
        None => TimingConfig::default(),
    };

    let ram = device::open_device(&cli.device, &timing, cli.trace)?;
    let mut ctrl = HyperBusController::new(timing, ram);

    let result = match cli.command {
        Commands::Read {
            address,
            count,
            register,
            output,
            burst,
        } => commands::run_read(
            &mut ctrl,
            address,
            count,
            register,
            output.as_deref(),
            &burst,
        ),
        Commands::Write {
            address,
            data,
            input,
            register,
            burst,
        } => commands::run_write(
            &mut ctrl,
            address,
            data,
            input.as_deref(),
            register,
            &burst,
        ),
        Commands::Verify {
            address,
            input,
            burst,
        } => commands::run_verify(&mut ctrl, address, &input, &burst),
        Commands::Info => commands::run_info(&mut ctrl),
    };

    if cli.trace {
        commands::print_trace(ctrl.phy().trace());
    }
    let ram = ctrl.phy();
    log::info!(
        "{} bus cycles, {} chip-select windows, longest CS# low {} clocks",
        ctrl.total_cycles(),
        ram.windows(),
        ram.max_cs_low()
    );
    if ram.tcsm_violations() > 0 {
        log::warn!("Device saw {} tCSM violations", ram.tcsm_violations());
    }

    result
}

//! Man page generator for hyperbus
//!
//! Writes `hyperbus.1` plus one `hyperbus-<command>.1` page per subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;

/// Render every page as (file name, roff text)
fn render_pages(mut cmd: clap::Command) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    // Propagate global options (-v, --config, -d, --trace) into subcommands
    cmd.build();

    let name = cmd.get_name().to_string();
    let mut pages = Vec::new();

    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd.clone()).render(&mut buffer)?;
    pages.push((format!("{}.1", name), buffer));

    for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
        let title = format!("{}-{}", name, sub.get_name());
        let mut buffer = Vec::new();
        clap_mangen::Man::new(sub.clone())
            .title(title.clone())
            .render(&mut buffer)?;
        pages.push((format!("{}.1", title), buffer));
    }

    Ok(pages)
}

fn main() -> std::io::Result<()> {
    // Default to ./man directory
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    for (file, buffer) in render_pages(cli::Cli::command())? {
        let output_path = output_dir.join(file);
        fs::write(&output_path, buffer)?;
        println!("Man page generated at: {}", output_path.display());
    }

    println!("\nTo view the main page:");
    println!("  man -l {}", output_dir.join("hyperbus.1").display());

    Ok(())
}

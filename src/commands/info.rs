//! Info command implementation

use super::transfer;
use hyperbus_core::bus::HyperBusController;
use hyperbus_core::ca::RegisterId;
use hyperbus_core::phy::HyperBusPhy;
use hyperbus_core::transaction::{AddressSpace, TransactionRequest};

/// Run the info command
pub fn run_info<P: HyperBusPhy>(
    ctrl: &mut HyperBusController<P>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ctrl.config().clone();
    println!("Controller timing:");
    println!(
        "  Initial latency: {} clocks ({})",
        config.initial_latency(),
        if config.fixed_latency() {
            "fixed"
        } else {
            "variable"
        }
    );
    println!(
        "  CS setup/hold:   {}/{} clocks",
        config.cs_setup(),
        config.cs_hold()
    );
    println!("  tCSM:            {} clocks", config.tcsm());
    println!("  Watchdog:        {} clocks", config.watchdog());
    println!("  Bus width:       {:?}", config.bus_width());
    println!();

    println!("Device registers:");
    for reg in RegisterId::ALL {
        let words = transfer(
            ctrl,
            TransactionRequest::read(AddressSpace::Register, reg.index(), 1),
        )?;
        let value = words.first().copied().unwrap_or_default();
        println!("  {}: 0x{:04X}  {}", reg.name(), value, describe(reg, value));
    }
    Ok(())
}

/// Human-readable summary of a register value
fn describe(reg: RegisterId, value: u16) -> String {
    match reg {
        RegisterId::Id0 => format!(
            "manufacturer {}, {} row / {} column address bits",
            match value & 0xF {
                0b0001 => "Cypress",
                0b0011 => "ISSI",
                _ => "unknown",
            },
            ((value >> 8) & 0x1F) + 1,
            ((value >> 4) & 0xF) + 1
        ),
        RegisterId::Id1 => format!("device type {}", value & 0xF),
        RegisterId::Cr0 => {
            let latency = cr0_latency(value)
                .map(|l| format!("{} clocks", l))
                .unwrap_or_else(|| "reserved".to_string());
            format!(
                "latency {} ({}), {} burst of {} bytes{}",
                latency,
                if value & (1 << 3) != 0 {
                    "fixed"
                } else {
                    "variable"
                },
                if value & (1 << 2) != 0 {
                    "wrapped"
                } else {
                    "hybrid"
                },
                match value & 0b11 {
                    0b00 => 128,
                    0b01 => 64,
                    0b10 => 16,
                    _ => 32,
                },
                if value & (1 << 15) == 0 {
                    ", deep power down"
                } else {
                    ""
                }
            )
        }
        RegisterId::Cr1 => format!("refresh interval code {}", value & 0b11),
    }
}

/// Initial latency selected by CR0[7:4]
fn cr0_latency(cr0: u16) -> Option<u32> {
    match (cr0 >> 4) & 0xF {
        0b0000 => Some(5),
        0b0001 => Some(6),
        0b0010 => Some(7),
        0b1110 => Some(3),
        0b1111 => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_reset_values() {
        assert_eq!(cr0_latency(0x8F1F), Some(6));
        assert_eq!(cr0_latency(0x8FEF), Some(3));
        assert_eq!(cr0_latency(0x8F5F), None);

        let text = describe(RegisterId::Cr0, 0x8F1F);
        assert!(text.contains("6 clocks"));
        assert!(text.contains("fixed"));
        assert!(text.contains("32 bytes"));

        let text = describe(RegisterId::Id0, 0x0C81);
        assert!(text.contains("Cypress"));
        assert!(text.contains("13 row / 9 column"));
    }
}

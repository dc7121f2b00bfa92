//! Device selection
//!
//! Devices are named like programmers in flash tools: `name` or
//! `name:key=value,key=value`.

use hyperbus_core::config::TimingConfig;
use hyperbus_sim::{SimConfig, SimHyperRam};
use thiserror::Error;

/// Device string errors
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Option is not of the form key=value
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    InvalidFormat(String),

    /// No device with this name
    #[error("Unknown device: {0} [available: sim]")]
    UnknownDevice(String),
}

/// Parsed device string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParams {
    /// Device name
    pub name: String,
    /// Options in the order given
    pub params: Vec<(String, String)>,
}

impl DeviceParams {
    /// Options as borrowed pairs
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a device string such as `sim:extra=always,stall=2`
pub fn parse_device_params(s: &str) -> Result<DeviceParams, DeviceError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = Vec::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.push((key.to_string(), value.to_string()));
            } else {
                return Err(DeviceError::InvalidFormat(opt.to_string()));
            }
        }
    }

    Ok(DeviceParams {
        name: name.to_string(),
        params,
    })
}

/// Open the device named by `spec`, matched to the controller's timing
pub fn open_device(
    spec: &str,
    timing: &TimingConfig,
    trace: bool,
) -> Result<SimHyperRam, Box<dyn std::error::Error>> {
    let params = parse_device_params(spec)?;

    match params.name.as_str() {
        "sim" => {
            let config = SimConfig::matching(timing)
                .with_trace(trace)
                .apply_options(&params.pairs())?;
            log::info!(
                "Using simulated HyperRAM ({} words, {:?})",
                config.size_words,
                config.bus_width
            );
            Ok(SimHyperRam::new(config)?)
        }
        other => Err(DeviceError::UnknownDevice(other.to_string()).into()),
    }
}

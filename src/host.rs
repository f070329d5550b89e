//! Host capability probing.
//!
//! The only fact the backend needs from the host is the base CPU frequency,
//! used to decide whether a TD guest gets a synthetic TSC frequency pinned.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Frequency threshold (kHz) below which a TD guest gets `tsc-freq` pinned.
pub const TSC_PIN_THRESHOLD_KHZ: u64 = 1_000_000;

/// Synthetic TSC frequency (Hz) applied when the host base frequency is
/// below [`TSC_PIN_THRESHOLD_KHZ`].
pub const TSC_PIN_FREQ_HZ: u64 = 1_000_000_000;

/// Read access to host capabilities.
pub trait HostProbe {
    /// Base CPU frequency in kHz.
    fn cpu_base_freq_khz(&self) -> Result<u64>;
}

/// [`HostProbe`] reading sysfs cpufreq on Linux.
#[derive(Debug, Default)]
pub struct SysfsHostProbe;

const BASE_FREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/base_frequency";

impl SysfsHostProbe {
    /// Create a new sysfs-backed probe.
    pub fn new() -> Self {
        Self
    }

    fn read_freq(path: &Path) -> Result<u64> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::HostProbe(format!("read {}: {}", path.display(), e)))?;
        raw.trim()
            .parse::<u64>()
            .map_err(|e| Error::HostProbe(format!("parse {}: {}", path.display(), e)))
    }
}

impl HostProbe for SysfsHostProbe {
    fn cpu_base_freq_khz(&self) -> Result<u64> {
        Self::read_freq(Path::new(BASE_FREQ_PATH))
    }
}

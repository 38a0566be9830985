use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

pub const CORE_COUNT_RANGE: RangeInclusive<u64> = 1..=64;
pub const RAM_MB_RANGE: RangeInclusive<u64> = 512..=65536;
pub const DISK_GB_RANGE: RangeInclusive<u64> = 10..=10240;

/// Rejects `value` unless it lies inside `range`. Values are never clamped.
pub(crate) fn check_range(resource: &'static str, value: u64, range: &RangeInclusive<u64>) -> Result<()> {
    if range.contains(&value) {
        return Ok(());
    }

    Err(KernelError::InvalidHardware {
        resource,
        value,
        min: *range.start(),
        max: *range.end(),
    })
}

/// Sizing of the simulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub ram_mb: u64,
    pub disk_gb: u64,
    pub core_count: u64,
}

impl HardwareConfig {
    pub fn new(ram_mb: u64, disk_gb: u64, core_count: u64) -> Result<HardwareConfig> {
        let config = HardwareConfig { ram_mb, disk_gb, core_count };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("core count", self.core_count, &CORE_COUNT_RANGE)?;
        check_range("RAM (MB)", self.ram_mb, &RAM_MB_RANGE)?;
        check_range("disk (GB)", self.disk_gb, &DISK_GB_RANGE)
    }
}

impl Default for HardwareConfig {
    fn default() -> HardwareConfig {
        HardwareConfig {
            ram_mb: 4096,
            disk_gb: 500,
            core_count: 4,
        }
    }
}

/// Tunables for the kernel that are not part of the hardware.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Scheduler tick interval.
    pub quantum_ms: u64,
    /// Pacing delay inserted after every boot stage.
    pub boot_stage_delay_ms: u64,
    /// Terminated PCBs kept for status reads. Oldest are dropped first.
    pub history_limit: usize,
    /// Run the scheduler on a background thread. When off, callers drive `tick()` themselves.
    pub auto_tick: bool,
}

impl KernelConfig {
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    pub fn boot_stage_delay(&self) -> Duration {
        Duration::from_millis(self.boot_stage_delay_ms)
    }
}

impl Default for KernelConfig {
    fn default() -> KernelConfig {
        KernelConfig {
            quantum_ms: 100,
            boot_stage_delay_ms: 0,
            history_limit: 256,
            auto_tick: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_config_accepts_bounds() {
        assert!(HardwareConfig::new(512, 10, 1).is_ok());
        assert!(HardwareConfig::new(65536, 10240, 64).is_ok());
    }

    #[test]
    fn test_hardware_config_rejects_out_of_range() {
        let err = HardwareConfig::new(4096, 500, 65).unwrap_err();
        assert!(matches!(err, KernelError::InvalidHardware { resource: "core count", value: 65, .. }));

        assert!(HardwareConfig::new(511, 500, 4).is_err());
        assert!(HardwareConfig::new(4096, 9, 4).is_err());
        assert!(HardwareConfig::new(4096, 10241, 4).is_err());
        assert!(HardwareConfig::new(4096, 500, 0).is_err());
    }

    #[test]
    fn test_kernel_config_partial_json_uses_defaults() {
        let config: KernelConfig = serde_json::from_str(r#"{ "quantum_ms": 20 }"#).unwrap();
        assert_eq!(config.quantum(), Duration::from_millis(20));
        assert_eq!(config.history_limit, 256);
        assert!(config.auto_tick);
    }
}

use serde::Serialize;

use super::{CoreStatus, Mode, QueueDepths};

/// Point-in-time view of the machine for display.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub mode: Mode,
    pub cpu_utilization: f64,
    pub cores: Vec<CoreStatus>,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    /// Disk figures are in 1 KiB units.
    pub disk_used: u64,
    pub disk_total: u64,
    pub queues: QueueDepths,
    pub file_count: usize,
}

impl SystemStatus {
    pub fn memory_percentage(&self) -> f64 {
        self.memory_used_mb as f64 / self.memory_total_mb as f64 * 100.0
    }

    pub fn disk_percentage(&self) -> f64 {
        self.disk_used as f64 / self.disk_total as f64 * 100.0
    }
}

use std::sync::Mutex;

use log::trace;
use serde::Serialize;

use super::{lock, ProcessId};
use crate::config::{check_range, CORE_COUNT_RANGE};
use crate::error::Result;

pub type CoreId = usize;

/// One simulated execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoreStatus {
    pub id: CoreId,
    pub process_id: Option<ProcessId>,
}

/// Owns the fixed set of cores. A core holds at most one process at a time.
pub struct CoreAllocator {
    cores: Mutex<Vec<Option<ProcessId>>>,
}

impl CoreAllocator {
    pub fn new(core_count: u64) -> Result<CoreAllocator> {
        check_range("core count", core_count, &CORE_COUNT_RANGE)?;

        Ok(CoreAllocator {
            cores: Mutex::new(vec![None; core_count as usize]),
        })
    }

    /// Hands the lowest-numbered idle core to `process_id`, or `None` when every core is busy.
    pub fn acquire(&self, process_id: ProcessId) -> Option<CoreId> {
        let mut cores = lock(&self.cores);
        let core_id = cores.iter().position(Option::is_none)?;
        cores[core_id] = Some(process_id);
        trace!("core {} assigned to process {}", core_id, process_id);
        Some(core_id)
    }

    /// Marks the core idle and returns whoever held it. Releasing an idle or unknown core is a no-op.
    pub fn release(&self, core_id: CoreId) -> Option<ProcessId> {
        let mut cores = lock(&self.cores);
        let previous = cores.get_mut(core_id)?.take();
        if let Some(process_id) = previous {
            trace!("core {} released by process {}", core_id, process_id);
        }
        previous
    }

    pub fn get_holder(&self, core_id: CoreId) -> Option<ProcessId> {
        lock(&self.cores).get(core_id).copied().flatten()
    }

    pub fn get_core_count(&self) -> usize {
        lock(&self.cores).len()
    }

    pub fn get_busy_count(&self) -> usize {
        lock(&self.cores).iter().filter(|core| core.is_some()).count()
    }

    pub fn get_idle_count(&self) -> usize {
        lock(&self.cores).iter().filter(|core| core.is_none()).count()
    }

    /// Busy cores as a percentage of all cores.
    pub fn get_utilization(&self) -> f64 {
        let cores = lock(&self.cores);
        let busy = cores.iter().filter(|core| core.is_some()).count();
        busy as f64 / cores.len() as f64 * 100.0
    }

    pub fn snapshot(&self) -> Vec<CoreStatus> {
        lock(&self.cores)
            .iter()
            .enumerate()
            .map(|(id, process_id)| CoreStatus { id, process_id: *process_id })
            .collect()
    }
}

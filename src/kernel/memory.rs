use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::{lock, ProcessId};
use crate::config::{check_range, RAM_MB_RANGE};
use crate::error::Result;

/// A reservation of RAM owned by one process.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryBlock {
    pub owner: ProcessId,
    pub size_mb: u64,
    pub allocated_at: DateTime<Utc>,
}

/// Fixed-capacity RAM accounting. Used and free figures are always derived from the live blocks.
pub struct MemoryAllocator {
    total_mb: u64,
    blocks: Mutex<Vec<MemoryBlock>>,
}

impl MemoryAllocator {
    pub fn new(total_mb: u64) -> Result<MemoryAllocator> {
        check_range("RAM (MB)", total_mb, &RAM_MB_RANGE)?;

        Ok(MemoryAllocator {
            total_mb,
            blocks: Mutex::new(Vec::new()),
        })
    }

    /// Reserves `size_mb` for `owner`. Nothing is reserved on failure.
    pub fn allocate(&self, owner: ProcessId, size_mb: u64) -> bool {
        if size_mb == 0 {
            return false;
        }

        let mut blocks = lock(&self.blocks);
        let used: u64 = blocks.iter().map(|block| block.size_mb).sum();

        if self.total_mb - used < size_mb {
            debug!(
                "memory request of {} MB for process {} refused, {} MB free",
                size_mb,
                owner,
                self.total_mb - used
            );
            return false;
        }

        blocks.push(MemoryBlock {
            owner,
            size_mb,
            allocated_at: Utc::now(),
        });
        debug!("allocated {} MB to process {}", size_mb, owner);

        true
    }

    /// Releases every block held by `owner`. Returns the amount freed, zero if it held nothing.
    pub fn deallocate(&self, owner: ProcessId) -> u64 {
        let mut blocks = lock(&self.blocks);
        let mut freed = 0;

        blocks.retain(|block| {
            if block.owner == owner {
                freed += block.size_mb;
                false
            } else {
                true
            }
        });

        if freed > 0 {
            debug!("freed {} MB from process {}", freed, owner);
        }
        freed
    }

    /// Drops every block. Refused outside kernel mode.
    pub fn clear_all(&self, is_privileged: bool) -> bool {
        if !is_privileged {
            warn!("memory wipe refused: kernel mode required");
            return false;
        }

        lock(&self.blocks).clear();
        debug!("memory wiped");
        true
    }

    pub fn get_total(&self) -> u64 {
        self.total_mb
    }

    pub fn get_used(&self) -> u64 {
        lock(&self.blocks).iter().map(|block| block.size_mb).sum()
    }

    pub fn get_remaining(&self) -> u64 {
        self.total_mb - self.get_used()
    }

    pub fn get_usage_percentage(&self) -> f64 {
        self.get_used() as f64 / self.total_mb as f64 * 100.0
    }

    pub fn get_allocated_for(&self, owner: ProcessId) -> u64 {
        lock(&self.blocks)
            .iter()
            .filter(|block| block.owner == owner)
            .map(|block| block.size_mb)
            .sum()
    }

    pub fn get_blocks(&self) -> Vec<MemoryBlock> {
        lock(&self.blocks).clone()
    }
}

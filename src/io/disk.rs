use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::config::{check_range, DISK_GB_RANGE};
use crate::error::Result;
use crate::kernel::lock;

/// Capacity units per GB. One unit is 1 KiB.
pub const UNITS_PER_GB: u64 = 1024 * 1024;
pub const BYTES_PER_UNIT: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockId(u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk-{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskBlock {
    pub id: BlockId,
    pub name: String,
    pub size: u64,
    pub allocated_at: DateTime<Utc>,
}

struct DiskState {
    blocks: Vec<DiskBlock>,
    next_block_id: u64,
}

/// Fixed-capacity storage accounting keyed by name.
pub struct DiskAllocator {
    total_units: u64,
    state: Mutex<DiskState>,
}

impl DiskAllocator {
    pub fn new(total_gb: u64) -> Result<DiskAllocator> {
        check_range("disk (GB)", total_gb, &DISK_GB_RANGE)?;

        Ok(DiskAllocator {
            total_units: total_gb * UNITS_PER_GB,
            state: Mutex::new(DiskState {
                blocks: Vec::new(),
                next_block_id: 1,
            }),
        })
    }

    /// Units needed to store `bytes`. Even an empty file takes one unit.
    pub fn units_for(bytes: usize) -> u64 {
        (bytes as u64).div_ceil(BYTES_PER_UNIT).max(1)
    }

    /// Reserves `size` units under `name`. A zero request still takes one unit.
    pub fn allocate(&self, name: &str, size: u64) -> Option<BlockId> {
        let size = size.max(1);
        let mut state = lock(&self.state);
        let used: u64 = state.blocks.iter().map(|block| block.size).sum();

        if self.total_units - used < size {
            debug!("disk request of {} units for '{}' refused, {} free", size, name, self.total_units - used);
            return None;
        }

        let id = BlockId(state.next_block_id);
        state.next_block_id += 1;
        state.blocks.push(DiskBlock {
            id,
            name: name.to_string(),
            size,
            allocated_at: Utc::now(),
        });
        debug!("allocated {} ({} units) for '{}'", id, size, name);

        Some(id)
    }

    /// Releases one block. Returns the units freed, zero if no such block exists.
    pub fn deallocate_block(&self, id: BlockId) -> u64 {
        let mut state = lock(&self.state);
        match state.blocks.iter().position(|block| block.id == id) {
            Some(idx) => state.blocks.remove(idx).size,
            None => 0,
        }
    }

    /// Releases every block stored under `name`.
    pub fn deallocate_by_name(&self, name: &str) -> u64 {
        let mut state = lock(&self.state);
        let mut freed = 0;

        state.blocks.retain(|block| {
            if block.name == name {
                freed += block.size;
                false
            } else {
                true
            }
        });

        if freed > 0 {
            debug!("freed {} units held by '{}'", freed, name);
        }
        freed
    }

    pub fn exists(&self, name: &str) -> bool {
        lock(&self.state).blocks.iter().any(|block| block.name == name)
    }

    /// Drops every block. Refused outside kernel mode.
    pub fn clear_all(&self, is_privileged: bool) -> bool {
        if !is_privileged {
            warn!("disk wipe refused: kernel mode required");
            return false;
        }

        lock(&self.state).blocks.clear();
        debug!("disk wiped");
        true
    }

    pub fn get_total(&self) -> u64 {
        self.total_units
    }

    pub fn get_used(&self) -> u64 {
        lock(&self.state).blocks.iter().map(|block| block.size).sum()
    }

    pub fn get_remaining(&self) -> u64 {
        self.total_units - self.get_used()
    }

    pub fn get_usage_percentage(&self) -> f64 {
        self.get_used() as f64 / self.total_units as f64 * 100.0
    }

    pub fn get_blocks(&self) -> Vec<DiskBlock> {
        lock(&self.state).blocks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_allocate_then_exists() {
        let disk = DiskAllocator::new(10).unwrap();
        let id = disk.allocate("/documents/a.txt", 4).unwrap();

        assert!(disk.exists("/documents/a.txt"));
        assert_eq!(disk.get_used(), 4);
        assert_eq!(disk.get_blocks()[0].id, id);
    }

    #[test]
    fn test_disk_zero_request_takes_one_unit() {
        let disk = DiskAllocator::new(10).unwrap();
        disk.allocate("empty", 0).unwrap();
        assert_eq!(disk.get_used(), 1);
    }

    #[test]
    fn test_disk_units_for_rounds_up() {
        assert_eq!(DiskAllocator::units_for(0), 1);
        assert_eq!(DiskAllocator::units_for(1), 1);
        assert_eq!(DiskAllocator::units_for(1024), 1);
        assert_eq!(DiskAllocator::units_for(1025), 2);
    }

    #[test]
    fn test_disk_full_refuses_allocation() {
        let disk = DiskAllocator::new(10).unwrap();
        let total = disk.get_total();

        assert!(disk.allocate("big", total - 1).is_some());
        assert!(disk.allocate("fits", 1).is_some());
        assert!(disk.allocate("overflow", 1).is_none());
        assert_eq!(disk.get_used(), total);
    }

    #[test]
    fn test_disk_deallocate_by_name_removes_all_matching() {
        let disk = DiskAllocator::new(10).unwrap();
        disk.allocate("log", 3);
        disk.allocate("log", 5);
        disk.allocate("other", 2);

        assert_eq!(disk.deallocate_by_name("log"), 8);
        assert!(!disk.exists("log"));
        assert_eq!(disk.get_used(), 2);
        assert_eq!(disk.deallocate_by_name("log"), 0);
    }

    #[test]
    fn test_disk_used_never_exceeds_total() {
        let disk = DiskAllocator::new(10).unwrap();
        let total = disk.get_total();
        let mut live: Vec<(BlockId, u64)> = Vec::new();

        for step in 0..200u64 {
            let size = (step * 7919 % 5) * (total / 8) + 1;
            if let Some(id) = disk.allocate(&format!("file-{}", step), size) {
                live.push((id, size));
            }
            if step % 3 == 0 && !live.is_empty() {
                let (id, size) = live.remove(0);
                assert_eq!(disk.deallocate_block(id), size);
            }

            let expected: u64 = live.iter().map(|(_, size)| size).sum();
            assert_eq!(disk.get_used(), expected);
            assert!(disk.get_used() <= total);
            assert_eq!(disk.get_blocks().iter().map(|block| block.size).sum::<u64>(), expected);
        }
    }

    #[test]
    fn test_disk_deallocate_block() {
        let disk = DiskAllocator::new(10).unwrap();
        let first = disk.allocate("log", 3).unwrap();
        disk.allocate("log", 5);

        assert_eq!(disk.deallocate_block(first), 3);
        assert_eq!(disk.deallocate_block(first), 0);
        assert!(disk.exists("log"));
        assert_eq!(disk.get_used(), 5);
    }

    #[test]
    fn test_disk_clear_all_requires_privilege() {
        let disk = DiskAllocator::new(10).unwrap();
        disk.allocate("a", 1);

        assert!(!disk.clear_all(false));
        assert!(disk.exists("a"));
        assert!(disk.clear_all(true));
        assert_eq!(disk.get_used(), 0);
    }

    #[test]
    fn test_disk_rejects_invalid_capacity() {
        assert!(DiskAllocator::new(9).is_err());
        assert!(DiskAllocator::new(10241).is_err());
    }
}

use std::sync::Mutex;

use log::{info, warn};

use super::{lock, MemoryAllocator, ProcessControlBlock, ProcessId, Scheduler};
use crate::error::{KernelError, Result};
use crate::io::WorkloadDescriptor;

/// Admission control: turns a descriptor into a process once its memory is reserved.
pub(crate) struct LongTermScheduler {
    next_process_id: Mutex<ProcessId>,
}

impl LongTermScheduler {
    pub fn new() -> LongTermScheduler {
        LongTermScheduler {
            next_process_id: Mutex::new(1),
        }
    }

    /// Reserves memory, creates the PCB and hands it to the scheduler.
    ///
    /// IDs increase monotonically and a refused admission does not use one up.
    pub fn admit(
        &self,
        descriptor: &WorkloadDescriptor,
        memory: &MemoryAllocator,
        scheduler: &Scheduler,
    ) -> Result<ProcessId> {
        descriptor.validate()?;

        let process_id = {
            let mut next_process_id = lock(&self.next_process_id);
            let process_id = *next_process_id;

            if !memory.allocate(process_id, descriptor.memory_mb) {
                warn!(
                    "cannot start {}: needs {} MB, {} MB free",
                    descriptor.name,
                    descriptor.memory_mb,
                    memory.get_remaining()
                );
                return Err(KernelError::InsufficientMemory {
                    requested_mb: descriptor.memory_mb,
                    available_mb: memory.get_remaining(),
                });
            }

            *next_process_id += 1;
            process_id
        };

        let pcb = ProcessControlBlock::new(process_id, descriptor);
        info!(
            "admitted process {} ({}, {}, {} MB)",
            process_id, descriptor.name, descriptor.priority, descriptor.memory_mb
        );
        scheduler.admit(pcb);

        Ok(process_id)
    }
}

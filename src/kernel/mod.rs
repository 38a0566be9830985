mod boot;
mod cancel;
mod cpu;
mod long_term_scheduler;
mod memory;
mod mode;
mod process_control_block;
mod scheduler;
mod status;

use std::sync::{Mutex, MutexGuard, PoisonError};

use long_term_scheduler::LongTermScheduler;

pub use boot::{BootProgress, BootResult, BootSequence};
pub use cancel::CancelToken;
pub use cpu::{CoreAllocator, CoreId, CoreStatus};
pub use memory::{MemoryAllocator, MemoryBlock};
pub use mode::{Mode, ModeChange, ModeGate};
pub use process_control_block::{PriorityClass, ProcessControlBlock, ProcessId, ProcessState};
pub use scheduler::{ProcessTable, QueueDepths, Scheduler, TickReport};
pub use status::SystemStatus;

pub mod driver;

pub use driver::Driver;

/// Locks a component mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

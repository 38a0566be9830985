//! Resource-management core of a simulated operating system: core, memory and disk
//! allocators, a multilevel-queue scheduler, a user/kernel mode gate and an in-memory
//! file store, all driven through [`kernel::Driver`].

pub mod config;
pub mod error;
pub mod io;
pub mod kernel;

pub use config::{HardwareConfig, KernelConfig};
pub use error::{KernelError, Result};
pub use io::WorkloadDescriptor;
pub use kernel::{Driver, Mode, PriorityClass, ProcessId, ProcessState};

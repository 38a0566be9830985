use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::kernel::PriorityClass;

/// Everything the kernel knows about an application: an opaque unit of work with a
/// footprint and a duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub name: String,
    pub priority: PriorityClass,
    pub memory_mb: u64,
    pub execution_duration: Duration,
    pub is_background: bool,
}

impl WorkloadDescriptor {
    pub fn new(
        name: &str,
        priority: PriorityClass,
        memory_mb: u64,
        execution_duration: Duration,
        is_background: bool,
    ) -> WorkloadDescriptor {
        WorkloadDescriptor {
            name: name.to_string(),
            priority,
            memory_mb,
            execution_duration,
            is_background,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(KernelError::InvalidWorkload("name is empty".to_string()));
        }
        if self.memory_mb == 0 {
            return Err(KernelError::InvalidWorkload(format!(
                "{} requests no memory",
                self.name
            )));
        }
        Ok(())
    }
}

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CoreId;
use crate::io::WorkloadDescriptor;

pub type ProcessId = u32;

/// Lifecycle of a simulated process.
///
/// `Blocked` is modelled for I/O waits but nothing in the kernel produces it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Fixed at creation. High is served strictly before Normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityClass {
    High,
    Normal,
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityClass::High => f.pad("High"),
            PriorityClass::Normal => f.pad("Normal"),
        }
    }
}

/// The process control block. Holds process metadata.
///
/// The assigned core is set exactly while the state is `Running`. Progress only moves
/// while running and freezes once the process terminates.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessControlBlock {
    id: ProcessId,
    name: String,
    state: ProcessState,
    priority: PriorityClass,
    memory_mb: u64,
    core: Option<CoreId>,
    progress: u8,
    execution_duration: Duration,
    is_background: bool,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    terminated_at: Option<DateTime<Utc>>,
}

impl ProcessControlBlock {
    pub fn new(id: ProcessId, descriptor: &WorkloadDescriptor) -> ProcessControlBlock {
        ProcessControlBlock {
            id,
            name: descriptor.name.clone(),
            state: ProcessState::New,
            priority: descriptor.priority,
            memory_mb: descriptor.memory_mb,
            core: None,
            progress: 0,
            execution_duration: descriptor.execution_duration,
            is_background: descriptor.is_background,
            created_at: Utc::now(),
            started_at: None,
            terminated_at: None,
        }
    }

    pub fn get_id(&self) -> ProcessId {
        self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_state(&self) -> ProcessState {
        self.state
    }

    pub fn get_priority(&self) -> PriorityClass {
        self.priority
    }

    pub fn get_memory_mb(&self) -> u64 {
        self.memory_mb
    }

    pub fn get_core(&self) -> Option<CoreId> {
        self.core
    }

    pub fn get_progress(&self) -> u8 {
        self.progress
    }

    pub fn get_execution_duration(&self) -> Duration {
        self.execution_duration
    }

    pub fn is_background(&self) -> bool {
        self.is_background
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn get_started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn get_terminated_at(&self) -> Option<DateTime<Utc>> {
        self.terminated_at
    }

    /// Completed on its own rather than being killed part way.
    pub fn completed_naturally(&self) -> bool {
        self.state == ProcessState::Terminated && self.progress == 100
    }

    /// Creation to termination, in milliseconds.
    pub fn turnaround_time_ms(&self) -> Option<i64> {
        self.terminated_at
            .map(|terminated_at| (terminated_at - self.created_at).num_milliseconds())
    }

    /// Percentage points gained per tick: `round(quantum / duration * 100)`, at least one
    /// so that very long workloads still finish.
    pub fn progress_step(&self, quantum: Duration) -> u8 {
        if self.execution_duration.is_zero() {
            return 100;
        }

        let step = (quantum.as_secs_f64() / self.execution_duration.as_secs_f64() * 100.0).round();
        step.clamp(1.0, 100.0) as u8
    }

    pub(crate) fn mark_ready(&mut self) {
        if self.state == ProcessState::New {
            self.state = ProcessState::Ready;
        }
    }

    pub(crate) fn dispatch(&mut self, core_id: CoreId) {
        self.state = ProcessState::Running;
        self.core = Some(core_id);
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Moves a running process forward. Returns true once it has reached 100.
    pub(crate) fn advance(&mut self, quantum: Duration) -> bool {
        if self.state != ProcessState::Running {
            return false;
        }

        let step = self.progress_step(quantum);
        self.progress = self.progress.saturating_add(step).min(100);
        self.progress == 100
    }

    /// Enters the absorbing `Terminated` state and hands back the core that must be released.
    pub(crate) fn terminate(&mut self) -> Option<CoreId> {
        self.state = ProcessState::Terminated;
        self.terminated_at = Some(Utc::now());
        self.core.take()
    }
}

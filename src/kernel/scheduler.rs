use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use super::{lock, CancelToken, CoreAllocator, MemoryAllocator, PriorityClass, ProcessControlBlock, ProcessId};

/// Copy of every process the scheduler knows about, grouped by where it sits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessTable {
    pub ready_high: Vec<ProcessControlBlock>,
    pub ready_normal: Vec<ProcessControlBlock>,
    pub running: Vec<ProcessControlBlock>,
    pub blocked: Vec<ProcessControlBlock>,
    pub terminated: Vec<ProcessControlBlock>,
}

impl ProcessTable {
    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.ready_high
            .iter()
            .chain(&self.ready_normal)
            .chain(&self.running)
            .chain(&self.blocked)
            .chain(&self.terminated)
    }

    pub fn find(&self, process_id: ProcessId) -> Option<&ProcessControlBlock> {
        self.iter().find(|pcb| pcb.get_id() == process_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueDepths {
    pub ready_high: usize,
    pub ready_normal: usize,
    pub running: usize,
    pub blocked: usize,
    pub terminated: usize,
}

/// What a single tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub completed: Vec<ProcessId>,
    pub dispatched: Vec<ProcessId>,
}

#[derive(Default)]
struct Queues {
    high: VecDeque<ProcessControlBlock>,
    normal: VecDeque<ProcessControlBlock>,
    running: Vec<ProcessControlBlock>,
    blocked: Vec<ProcessControlBlock>,
    terminated: VecDeque<ProcessControlBlock>,
}

impl Queues {
    fn ready_queue(&mut self, priority: PriorityClass) -> &mut VecDeque<ProcessControlBlock> {
        match priority {
            PriorityClass::High => &mut self.high,
            PriorityClass::Normal => &mut self.normal,
        }
    }

    /// Pulls the process out of whichever live set holds it.
    fn take(&mut self, process_id: ProcessId) -> Option<ProcessControlBlock> {
        if let Some(idx) = self.running.iter().position(|pcb| pcb.get_id() == process_id) {
            return Some(self.running.remove(idx));
        }
        if let Some(idx) = self.high.iter().position(|pcb| pcb.get_id() == process_id) {
            return self.high.remove(idx);
        }
        if let Some(idx) = self.normal.iter().position(|pcb| pcb.get_id() == process_id) {
            return self.normal.remove(idx);
        }
        if let Some(idx) = self.blocked.iter().position(|pcb| pcb.get_id() == process_id) {
            return Some(self.blocked.remove(idx));
        }
        None
    }
}

/// Multilevel queue scheduler: a High and a Normal FIFO, served strictly in that order.
///
/// Once dispatched a process keeps its core until it completes or is terminated; there is
/// no time-slice eviction back to `Ready`.
pub struct Scheduler {
    cpu: Arc<CoreAllocator>,
    memory: Arc<MemoryAllocator>,
    quantum: Duration,
    history_limit: usize,
    queues: Mutex<Queues>,
}

impl Scheduler {
    pub fn new(
        cpu: Arc<CoreAllocator>,
        memory: Arc<MemoryAllocator>,
        quantum: Duration,
        history_limit: usize,
    ) -> Scheduler {
        Scheduler {
            cpu,
            memory,
            quantum,
            history_limit,
            queues: Mutex::new(Queues::default()),
        }
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    /// Enqueues a new process at the back of its priority class.
    pub fn admit(&self, mut pcb: ProcessControlBlock) {
        pcb.mark_ready();
        debug!("process {} ({}) ready in {} queue", pcb.get_id(), pcb.get_name(), pcb.get_priority());

        let mut queues = lock(&self.queues);
        queues.ready_queue(pcb.get_priority()).push_back(pcb);
    }

    /// One scheduling round: retire finished work, hand idle cores to High then Normal,
    /// then advance everything that is running.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut queues = lock(&self.queues);

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut queues.running)
            .into_iter()
            .partition(|pcb| pcb.get_progress() >= 100);
        queues.running = running;

        for pcb in finished {
            info!("process {} ({}) completed", pcb.get_id(), pcb.get_name());
            report.completed.push(pcb.get_id());
            self.retire(&mut queues, pcb);
        }

        for priority in [PriorityClass::High, PriorityClass::Normal] {
            self.dispatch_from(&mut queues, priority, &mut report.dispatched);
        }

        for pcb in queues.running.iter_mut() {
            pcb.advance(self.quantum);
        }

        report
    }

    fn dispatch_from(&self, queues: &mut Queues, priority: PriorityClass, dispatched: &mut Vec<ProcessId>) {
        while let Some(process_id) = queues.ready_queue(priority).front().map(ProcessControlBlock::get_id) {
            let Some(core_id) = self.cpu.acquire(process_id) else {
                break;
            };
            let Some(mut pcb) = queues.ready_queue(priority).pop_front() else {
                self.cpu.release(core_id);
                break;
            };

            pcb.dispatch(core_id);
            debug!("process {} ({}) running on core {}", pcb.get_id(), pcb.get_name(), core_id);
            dispatched.push(pcb.get_id());
            queues.running.push(pcb);
        }
    }

    /// Kills a live process from any set. Refused outside kernel mode.
    pub fn terminate(&self, process_id: ProcessId, is_privileged: bool) -> bool {
        if !is_privileged {
            warn!("termination of process {} refused: kernel mode required", process_id);
            return false;
        }

        let mut queues = lock(&self.queues);
        let Some(pcb) = queues.take(process_id) else {
            debug!("terminate: no live process {}", process_id);
            return false;
        };

        info!("process {} ({}) terminated at {}%", pcb.get_id(), pcb.get_name(), pcb.get_progress());
        self.retire(&mut queues, pcb);
        true
    }

    /// Terminates every live process. Returns how many were stopped.
    pub fn terminate_all(&self) -> usize {
        let mut queues = lock(&self.queues);
        let mut live: Vec<ProcessControlBlock> = Vec::new();
        live.append(&mut queues.running);
        live.extend(queues.high.drain(..));
        live.extend(queues.normal.drain(..));
        live.append(&mut queues.blocked);

        let count = live.len();
        for pcb in live {
            self.retire(&mut queues, pcb);
        }
        count
    }

    /// Releases the process's core and memory and appends it to the bounded history.
    fn retire(&self, queues: &mut Queues, mut pcb: ProcessControlBlock) {
        if let Some(core_id) = pcb.terminate() {
            self.cpu.release(core_id);
        }
        self.memory.deallocate(pcb.get_id());

        queues.terminated.push_back(pcb);
        while queues.terminated.len() > self.history_limit {
            queues.terminated.pop_front();
        }
    }

    pub fn process(&self, process_id: ProcessId) -> Option<ProcessControlBlock> {
        let queues = lock(&self.queues);
        queues
            .running
            .iter()
            .chain(&queues.high)
            .chain(&queues.normal)
            .chain(&queues.blocked)
            .chain(&queues.terminated)
            .find(|pcb| pcb.get_id() == process_id)
            .cloned()
    }

    pub fn processes(&self) -> ProcessTable {
        let queues = lock(&self.queues);
        ProcessTable {
            ready_high: queues.high.iter().cloned().collect(),
            ready_normal: queues.normal.iter().cloned().collect(),
            running: queues.running.clone(),
            blocked: queues.blocked.clone(),
            terminated: queues.terminated.iter().cloned().collect(),
        }
    }

    pub fn queue_depths(&self) -> QueueDepths {
        let queues = lock(&self.queues);
        QueueDepths {
            ready_high: queues.high.len(),
            ready_normal: queues.normal.len(),
            running: queues.running.len(),
            blocked: queues.blocked.len(),
            terminated: queues.terminated.len(),
        }
    }

    /// Nothing ready, running or blocked.
    pub fn is_idle(&self) -> bool {
        let queues = lock(&self.queues);
        queues.high.is_empty()
            && queues.normal.is_empty()
            && queues.running.is_empty()
            && queues.blocked.is_empty()
    }

    /// Runs `tick` once per quantum on a background thread until `cancel` fires.
    pub fn spawn_ticker(self: &Arc<Self>, cancel: CancelToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        let interval = self.quantum.max(Duration::from_millis(1));

        thread::spawn(move || {
            debug!("scheduler ticking every {:?}", interval);
            while cancel.sleep(interval) {
                scheduler.tick();
            }
            debug!("scheduler ticker stopped");
        })
    }
}

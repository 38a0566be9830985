use std::cell::RefCell;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{info, warn};

use super::*;

use crate::config::{HardwareConfig, KernelConfig};
use crate::error::{KernelError, Result};
use crate::io::{DiskAllocator, FileStore, WorkloadDescriptor};

/// Everything that exists only while the kernel is booted.
struct System {
    hardware: HardwareConfig,
    cpu: Arc<CoreAllocator>,
    memory: Arc<MemoryAllocator>,
    disk: Arc<DiskAllocator>,
    files: Arc<FileStore>,
    scheduler: Arc<Scheduler>,
    lts: LongTermScheduler,
    ticker_cancel: CancelToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl System {
    fn stop_ticker(&self) {
        self.ticker_cancel.cancel();
        if let Some(ticker) = lock(&self.ticker).take() {
            if ticker.join().is_err() {
                warn!("scheduler ticker panicked");
            }
        }
    }
}

/// Components built up stage by stage while booting.
#[derive(Default)]
struct Staging {
    hardware: RefCell<Option<HardwareConfig>>,
    cpu: RefCell<Option<Arc<CoreAllocator>>>,
    memory: RefCell<Option<Arc<MemoryAllocator>>>,
    disk: RefCell<Option<Arc<DiskAllocator>>>,
    files: RefCell<Option<Arc<FileStore>>>,
    scheduler: RefCell<Option<Arc<Scheduler>>>,
    ticker: RefCell<Option<JoinHandle<()>>>,
}

fn staged<T: Clone>(slot: &RefCell<Option<T>>, component: &str) -> Result<T> {
    slot.borrow().clone().ok_or_else(|| KernelError::BootStageFailed {
        stage: component.to_string(),
        reason: "not initialized".to_string(),
    })
}

impl Staging {
    fn into_system(self, ticker_cancel: CancelToken) -> Option<System> {
        Some(System {
            hardware: self.hardware.into_inner()?,
            cpu: self.cpu.into_inner()?,
            memory: self.memory.into_inner()?,
            disk: self.disk.into_inner()?,
            files: self.files.into_inner()?,
            scheduler: self.scheduler.into_inner()?,
            lts: LongTermScheduler::new(),
            ticker_cancel,
            ticker: Mutex::new(self.ticker.into_inner()),
        })
    }
}

/// Holds the virtual system environment, and is the single entry point callers use to
/// boot it, start and stop processes, switch mode and read status.
pub struct Driver {
    config: KernelConfig,
    mode: ModeGate,
    system: Mutex<Option<Arc<System>>>,
    boot_lock: Mutex<()>,
}

impl Driver {
    pub fn new(config: KernelConfig) -> Driver {
        Driver {
            config,
            mode: ModeGate::new(),
            system: Mutex::new(None),
            boot_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn system(&self) -> Option<Arc<System>> {
        lock(&self.system).clone()
    }

    pub fn is_booted(&self) -> bool {
        lock(&self.system).is_some()
    }

    pub fn boot(
        &self,
        ram_mb: u64,
        disk_gb: u64,
        core_count: u64,
        observer: impl FnMut(&BootProgress),
    ) -> BootResult {
        self.boot_with_cancel(ram_mb, disk_gb, core_count, &CancelToken::new(), observer)
    }

    /// Brings the allocators, file store and scheduler up. Out-of-range sizing fails the
    /// first stage. Cancelling `cancel` stops the boot before the next stage.
    pub fn boot_with_cancel(
        &self,
        ram_mb: u64,
        disk_gb: u64,
        core_count: u64,
        cancel: &CancelToken,
        mut observer: impl FnMut(&BootProgress),
    ) -> BootResult {
        let Ok(_boot_guard) = self.boot_lock.try_lock() else {
            return BootResult::failed("a boot is already in progress");
        };
        if self.is_booted() {
            return BootResult::failed(KernelError::AlreadyBooted.to_string());
        }

        info!("booting: {} MB RAM, {} GB disk, {} cores", ram_mb, disk_gb, core_count);

        let staging = Staging::default();
        let ticker_cancel = CancelToken::new();

        let result = BootSequence::new(self.config.boot_stage_delay())
            .stage("Checking hardware", || {
                *staging.hardware.borrow_mut() = Some(HardwareConfig::new(ram_mb, disk_gb, core_count)?);
                Ok(())
            })
            .stage("Initializing core allocator", || {
                *staging.cpu.borrow_mut() = Some(Arc::new(CoreAllocator::new(core_count)?));
                Ok(())
            })
            .stage("Initializing memory allocator", || {
                *staging.memory.borrow_mut() = Some(Arc::new(MemoryAllocator::new(ram_mb)?));
                Ok(())
            })
            .stage("Initializing disk allocator", || {
                *staging.disk.borrow_mut() = Some(Arc::new(DiskAllocator::new(disk_gb)?));
                Ok(())
            })
            .stage("Mounting virtual file system", || {
                let disk = staged(&staging.disk, "disk allocator")?;
                *staging.files.borrow_mut() = Some(Arc::new(FileStore::new(disk)));
                Ok(())
            })
            .stage("Starting scheduler", || {
                let scheduler = Arc::new(Scheduler::new(
                    staged(&staging.cpu, "core allocator")?,
                    staged(&staging.memory, "memory allocator")?,
                    self.config.quantum(),
                    self.config.history_limit,
                ));
                if self.config.auto_tick {
                    *staging.ticker.borrow_mut() = Some(scheduler.spawn_ticker(ticker_cancel.clone()));
                }
                *staging.scheduler.borrow_mut() = Some(scheduler);
                Ok(())
            })
            .stage("Entering user mode", || {
                self.mode.switch(Mode::User);
                Ok(())
            })
            .run(cancel, &mut observer);

        if !result.success {
            ticker_cancel.cancel();
            if let Some(ticker) = staging.ticker.take() {
                let _ = ticker.join();
            }
            return result;
        }

        match staging.into_system(ticker_cancel) {
            Some(system) => {
                *lock(&self.system) = Some(Arc::new(system));
                result
            }
            None => BootResult::failed("boot finished with components missing"),
        }
    }

    /// Stops the scheduler, terminates every live process and discards all state.
    /// Returns false if the kernel was not running.
    pub fn shutdown(&self) -> bool {
        let Some(system) = lock(&self.system).take() else {
            return false;
        };

        system.stop_ticker();
        let stopped = system.scheduler.terminate_all();
        system.files.clear_all(true);
        self.mode.switch(Mode::User);

        info!("shutdown complete, {} processes stopped", stopped);
        true
    }

    pub fn switch_mode(&self, mode: Mode) -> bool {
        self.mode.switch(mode)
    }

    pub fn current_mode(&self) -> Mode {
        self.mode.current()
    }

    pub fn is_privileged(&self) -> bool {
        self.mode.is_privileged()
    }

    pub fn subscribe_mode_changes(&self) -> Receiver<ModeChange> {
        self.mode.subscribe()
    }

    /// Admits a workload. Fails with `InsufficientMemory` when its footprint does not fit.
    pub fn start_application(&self, descriptor: &WorkloadDescriptor) -> Result<ProcessId> {
        // Held through admission so that shutdown cannot discard the scheduler underneath it.
        let guard = lock(&self.system);
        let system = guard.as_ref().ok_or(KernelError::NotBooted)?;
        system.lts.admit(descriptor, &system.memory, &system.scheduler)
    }

    pub fn terminate_process(&self, process_id: ProcessId, is_privileged: bool) -> bool {
        match self.system() {
            Some(system) => system.scheduler.terminate(process_id, is_privileged),
            None => false,
        }
    }

    /// Runs one scheduling round by hand.
    pub fn tick(&self) -> Option<TickReport> {
        self.system().map(|system| system.scheduler.tick())
    }

    pub fn hardware(&self) -> Option<HardwareConfig> {
        self.system().map(|system| system.hardware)
    }

    pub fn status(&self) -> Option<SystemStatus> {
        let system = self.system()?;
        Some(SystemStatus {
            mode: self.mode.current(),
            cpu_utilization: system.cpu.get_utilization(),
            cores: system.cpu.snapshot(),
            memory_used_mb: system.memory.get_used(),
            memory_total_mb: system.memory.get_total(),
            disk_used: system.disk.get_used(),
            disk_total: system.disk.get_total(),
            queues: system.scheduler.queue_depths(),
            file_count: system.files.len(),
        })
    }

    pub fn processes(&self) -> Option<ProcessTable> {
        self.system().map(|system| system.scheduler.processes())
    }

    pub fn process(&self, process_id: ProcessId) -> Option<ProcessControlBlock> {
        self.system()?.scheduler.process(process_id)
    }

    /// True when booted and nothing is ready, running or blocked.
    pub fn is_idle(&self) -> bool {
        self.system().is_some_and(|system| system.scheduler.is_idle())
    }

    /// The file store of the running system.
    pub fn files(&self) -> Option<Arc<FileStore>> {
        self.system().map(|system| system.files.clone())
    }

    /// Forced memory wipe. Refused outside kernel mode.
    pub fn clear_memory(&self, is_privileged: bool) -> bool {
        self.system()
            .is_some_and(|system| system.memory.clear_all(is_privileged))
    }

    /// Forced disk wipe: every file goes, then any remaining disk blocks.
    pub fn clear_disk(&self, is_privileged: bool) -> bool {
        self.system().is_some_and(|system| {
            system.files.clear_all(is_privileged) && system.disk.clear_all(is_privileged)
        })
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new(KernelConfig::default())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn manual_config() -> KernelConfig {
        KernelConfig {
            auto_tick: false,
            ..KernelConfig::default()
        }
    }

    fn booted(ram_mb: u64, disk_gb: u64, cores: u64) -> Driver {
        let driver = Driver::new(manual_config());
        let result = driver.boot(ram_mb, disk_gb, cores, |_| {});
        assert!(result.success, "{}", result.message);
        driver
    }

    fn app(name: &str, priority: PriorityClass, memory_mb: u64) -> WorkloadDescriptor {
        WorkloadDescriptor::new(name, priority, memory_mb, Duration::from_secs(1), false)
    }

    #[test]
    fn test_driver_boot_reports_progress() {
        let driver = Driver::new(manual_config());
        let mut reports = Vec::new();

        let result = driver.boot(4096, 500, 4, |progress| reports.push(progress.clone()));

        assert!(result.success);
        assert!(driver.is_booted());
        assert_eq!(reports.first().unwrap().stage, "Checking hardware");
        assert_eq!(reports.last().unwrap().percent, 100);
        assert!(reports.windows(2).all(|pair| pair[0].percent < pair[1].percent));
    }

    #[test]
    fn test_driver_boot_records_hardware() {
        let driver = booted(2048, 100, 2);

        assert_eq!(driver.hardware(), Some(HardwareConfig { ram_mb: 2048, disk_gb: 100, core_count: 2 }));
        assert!(!driver.config().auto_tick);

        let status = driver.status().unwrap();
        assert_eq!(status.cores.len(), 2);
        assert_eq!(status.memory_total_mb, 2048);
        assert_eq!(status.memory_percentage(), 0.0);
        assert_eq!(status.disk_percentage(), 0.0);

        driver.shutdown();
        assert_eq!(driver.hardware(), None);
    }

    #[test]
    fn test_driver_boot_rejects_invalid_hardware() {
        let driver = Driver::new(manual_config());

        let result = driver.boot(4096, 500, 65, |_| {});

        assert!(!result.success);
        assert!(result.message.contains("core count"));
        assert!(!driver.is_booted());
        assert!(matches!(driver.start_application(&app("x", PriorityClass::High, 1)), Err(KernelError::NotBooted)));
    }

    #[test]
    fn test_driver_boot_twice_fails() {
        let driver = booted(4096, 500, 4);
        assert!(!driver.boot(4096, 500, 4, |_| {}).success);
    }

    #[test]
    fn test_driver_boot_cancelled() {
        let driver = Driver::new(manual_config());
        let cancel = CancelToken::new();

        let result = driver.boot_with_cancel(4096, 500, 4, &cancel, |progress| {
            if progress.stage == "Initializing disk allocator" {
                cancel.cancel();
            }
        });

        assert!(!result.success);
        assert!(!driver.is_booted());
    }

    #[test]
    fn test_driver_fifth_process_exceeds_memory() {
        let driver = booted(4096, 500, 4);

        for expected in 1..=4 {
            let pid = driver.start_application(&app("big", PriorityClass::Normal, 1024)).unwrap();
            assert_eq!(pid, expected);
        }
        let fifth = driver.start_application(&app("big", PriorityClass::Normal, 1024));

        assert!(matches!(fifth, Err(KernelError::InsufficientMemory { .. })));
        assert_eq!(driver.status().unwrap().memory_used_mb, 4096);
    }

    #[test]
    fn test_driver_duplicate_file_create() {
        let driver = booted(4096, 500, 4);
        let files = driver.files().unwrap();

        assert!(files.create("a.txt", "/Documents", b"hi").is_some());
        assert!(files.create("a.txt", "/Documents", b"hi").is_none());
        assert_eq!(files.read_to_string("/Documents/a.txt").unwrap(), "hi");
    }

    #[test]
    fn test_driver_high_priority_wins_single_core() {
        let driver = booted(4096, 500, 1);
        let normal = driver.start_application(&app("background", PriorityClass::Normal, 128)).unwrap();
        let high = driver.start_application(&app("interactive", PriorityClass::High, 128)).unwrap();

        driver.tick();

        assert_eq!(driver.process(high).unwrap().get_state(), ProcessState::Running);
        assert_eq!(driver.process(normal).unwrap().get_state(), ProcessState::Ready);
    }

    #[test]
    fn test_driver_kernel_mode_terminate_running() {
        let driver = booted(4096, 500, 2);
        let pid = driver.start_application(&app("Paint", PriorityClass::High, 512)).unwrap();
        driver.tick();
        let before = driver.status().unwrap();
        assert_eq!(before.cpu_utilization, 50.0);

        assert!(!driver.terminate_process(pid, driver.is_privileged()));

        assert!(driver.switch_mode(Mode::Kernel));
        assert!(driver.terminate_process(pid, driver.is_privileged()));

        let after = driver.status().unwrap();
        assert_eq!(after.cpu_utilization, 0.0);
        assert_eq!(before.memory_used_mb - after.memory_used_mb, 512);
        assert_eq!(driver.process(pid).unwrap().get_state(), ProcessState::Terminated);
    }

    #[test]
    fn test_driver_mode_change_notification() {
        let driver = booted(4096, 500, 2);
        let changes = driver.subscribe_mode_changes();

        driver.switch_mode(Mode::Kernel);
        driver.switch_mode(Mode::Kernel);

        assert_eq!(changes.try_iter().collect::<Vec<_>>(), vec![ModeChange { old: Mode::User, new: Mode::Kernel }]);
    }

    #[test]
    fn test_driver_forced_wipes_require_privilege() {
        let driver = booted(4096, 500, 2);
        driver.start_application(&app("Paint", PriorityClass::High, 512)).unwrap();
        driver.files().unwrap().create("a.txt", "/", b"hi");

        assert!(!driver.clear_memory(false));
        assert!(!driver.clear_disk(false));
        assert_eq!(driver.status().unwrap().memory_used_mb, 512);

        assert!(driver.clear_memory(true));
        assert!(driver.clear_disk(true));
        let status = driver.status().unwrap();
        assert_eq!(status.memory_used_mb, 0);
        assert_eq!(status.disk_used, 0);
        assert!(!driver.files().unwrap().exists("/a.txt"));
    }

    #[test]
    fn test_driver_start_racing_shutdown_leaves_nothing_live() {
        for _ in 0..20 {
            let driver = Arc::new(booted(65536, 500, 4));
            let system = driver.system().unwrap();

            let starters: Vec<_> = (0..4)
                .map(|_| {
                    let driver = Arc::clone(&driver);
                    thread::spawn(move || {
                        (0..8)
                            .map(|_| driver.start_application(&app("Clock", PriorityClass::Normal, 16)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            driver.shutdown();

            for starter in starters {
                for outcome in starter.join().unwrap() {
                    match outcome {
                        Ok(pid) => {
                            let pcb = system.scheduler.process(pid).unwrap();
                            assert_eq!(pcb.get_state(), ProcessState::Terminated);
                        }
                        Err(err) => assert!(matches!(err, KernelError::NotBooted)),
                    }
                }
            }

            assert!(system.scheduler.is_idle());
            assert_eq!(system.memory.get_used(), 0);
        }
    }

    #[test]
    fn test_driver_shutdown_discards_state() {
        let driver = booted(4096, 500, 2);
        driver.start_application(&app("Paint", PriorityClass::High, 512)).unwrap();
        driver.switch_mode(Mode::Kernel);

        assert!(driver.shutdown());

        assert!(!driver.is_booted());
        assert!(driver.status().is_none());
        assert_eq!(driver.current_mode(), Mode::User);
        assert!(!driver.shutdown());

        assert!(driver.boot(2048, 100, 1, |_| {}).success);
        let pid = driver.start_application(&app("Paint", PriorityClass::High, 512)).unwrap();
        assert_eq!(pid, 1);
    }

    #[test]
    fn test_driver_concurrent_start_application() {
        let driver = Arc::new(booted(4096, 500, 4));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let driver = driver.clone();
                thread::spawn(move || driver.start_application(&app("job", PriorityClass::Normal, 512)).ok())
            })
            .collect();

        let mut pids: Vec<ProcessId> = handles.into_iter().filter_map(|handle| handle.join().unwrap()).collect();
        pids.sort_unstable();

        assert_eq!(pids, (1..=8).collect::<Vec<_>>());
        assert_eq!(driver.status().unwrap().memory_used_mb, 4096);
    }

    #[test]
    fn test_driver_auto_tick_runs_to_completion() {
        let driver = Driver::new(KernelConfig {
            quantum_ms: 5,
            ..KernelConfig::default()
        });
        assert!(driver.boot(4096, 500, 2, |_| {}).success);

        let quick = WorkloadDescriptor::new("Clock", PriorityClass::Normal, 64, Duration::from_millis(20), true);
        let pid = driver.start_application(&quick).unwrap();

        for _ in 0..400 {
            if driver.is_idle() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        let pcb = driver.process(pid).unwrap();
        assert!(pcb.completed_naturally());
        assert_eq!(driver.status().unwrap().memory_used_mb, 0);
        assert!(driver.shutdown());
    }
}

use std::fs;
use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use os_resource_simulator::io::loader::{self, WORKLOAD_FILE_PATH};
use os_resource_simulator::{Driver, KernelConfig};

/// Boots the simulated machine, runs a batch of workloads to completion and prints
/// per-process statistics.
#[derive(Parser)]
#[command(name = "os-resource-simulator", version, about)]
struct Args {
    /// Installed RAM in MB.
    #[arg(long, default_value_t = 4096)]
    ram_mb: u64,

    /// Disk size in GB.
    #[arg(long, default_value_t = 500)]
    disk_gb: u64,

    /// Number of CPU cores.
    #[arg(long, default_value_t = 4)]
    cores: u64,

    /// Scheduler quantum, overriding the config file.
    #[arg(long)]
    quantum_ms: Option<u64>,

    /// Kernel settings as JSON.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Workload file to run.
    #[arg(long, short, default_value = WORKLOAD_FILE_PATH)]
    workloads: PathBuf,

    /// Print the final system status as JSON.
    #[arg(long)]
    json: bool,

    #[arg(long, short)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<KernelConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => KernelConfig {
            boot_stage_delay_ms: 150,
            ..KernelConfig::default()
        },
    };

    if let Some(quantum_ms) = args.quantum_ms {
        config.quantum_ms = quantum_ms;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let driver = Driver::new(load_config(&args)?);

    println!("Booting the kernel.");
    let boot = driver.boot(args.ram_mb, args.disk_gb, args.cores, |progress| {
        println!("...[{:>3}%] {}", progress.percent, progress.message);
    });
    if !boot.success {
        bail!("boot failed: {}", boot.message);
    }
    if let Some(hardware) = driver.hardware() {
        println!(
            "Booted with {} MB RAM, {} GB disk and {} cores.",
            hardware.ram_mb, hardware.disk_gb, hardware.core_count
        );
    }

    let workloads = loader::load_workloads(&args.workloads)
        .with_context(|| format!("failed to load workloads from {}", args.workloads.display()))?;

    println!("Starting {} applications.", workloads.len());
    for workload in &workloads {
        match driver.start_application(workload) {
            Ok(process_id) => println!("...{} started as process {}", workload.name, process_id),
            Err(err) => warn!("{} not started: {}", workload.name, err),
        }
    }

    println!("Awaiting all scheduled processes to finish.");
    while !driver.is_idle() {
        if driver.config().auto_tick {
            thread::sleep(driver.config().quantum());
        } else {
            driver.tick();
        }
    }

    let processes = driver.processes().context("kernel stopped unexpectedly")?;
    println!("Stats for executed processes:");
    println!("... ID | Priority | Name                 | Turnaround Time (ms)");
    println!("...----|----------|----------------------|---------------------");
    for pcb in &processes.terminated {
        println!(
            "... {:02} | {:<8} | {:<20} | {:>8}",
            pcb.get_id(),
            pcb.get_priority(),
            pcb.get_name(),
            pcb.turnaround_time_ms().unwrap_or_default()
        );
    }

    let status = driver.status().context("kernel stopped unexpectedly")?;
    println!(
        "Memory in use: {:.1}%, disk in use: {:.1}%, {} files.",
        status.memory_percentage(),
        status.disk_percentage(),
        status.file_count
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    driver.shutdown();
    info!("done");
    Ok(())
}

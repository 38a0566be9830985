use std::fs;
use std::path::Path;
use std::time::Duration;

use log::debug;

use super::WorkloadDescriptor;
use crate::error::{KernelError, Result};
use crate::kernel::PriorityClass;

pub const WORKLOAD_FILE_PATH: &str = "data/workloads.txt";

const APP_CARD: &str = "// APP";

/// Reads a workload file into descriptors, in file order.
pub fn load_workloads(path: impl AsRef<Path>) -> Result<Vec<WorkloadDescriptor>> {
    let text = fs::read_to_string(path.as_ref())?;
    let workloads = parse_workloads(&text)?;
    debug!("loaded {} workloads from {}", workloads.len(), path.as_ref().display());
    Ok(workloads)
}

/// Parses every `// APP <name> <High|Normal> <memory_mb> <duration_ms> <fg|bg>` card.
/// The name may contain spaces. Blank lines and other comments are skipped.
pub fn parse_workloads(text: &str) -> Result<Vec<WorkloadDescriptor>> {
    let mut workloads = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if let Some(card) = line.strip_prefix(APP_CARD) {
            workloads.push(parse_app(card, idx + 1)?);
        } else if !line.is_empty() && !line.starts_with("//") {
            return Err(parse_error(idx + 1, format!("unexpected line '{}'", line)));
        }
    }

    Ok(workloads)
}

fn parse_error(line: usize, reason: String) -> KernelError {
    KernelError::Parse { line, reason }
}

/// Parses the APP control card of one workload.
fn parse_app(card: &str, line: usize) -> Result<WorkloadDescriptor> {
    let fields: Vec<&str> = card.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(parse_error(line, "APP control card is missing values".to_string()));
    }

    let (name, rest) = fields.split_at(fields.len() - 4);

    let priority = match rest[0].to_ascii_lowercase().as_str() {
        "high" => PriorityClass::High,
        "normal" => PriorityClass::Normal,
        other => return Err(parse_error(line, format!("unknown priority '{}'", other))),
    };

    let memory_mb = rest[1]
        .parse::<u64>()
        .map_err(|err| parse_error(line, format!("memory is not a number: {}", err)))?;

    let duration_ms = rest[2]
        .parse::<u64>()
        .map_err(|err| parse_error(line, format!("duration is not a number: {}", err)))?;

    let is_background = match rest[3].to_ascii_lowercase().as_str() {
        "bg" => true,
        "fg" => false,
        other => return Err(parse_error(line, format!("expected fg or bg, found '{}'", other))),
    };

    let descriptor = WorkloadDescriptor::new(
        &name.join(" "),
        priority,
        memory_mb,
        Duration::from_millis(duration_ms),
        is_background,
    );
    descriptor
        .validate()
        .map_err(|err| parse_error(line, err.to_string()))?;

    Ok(descriptor)
}

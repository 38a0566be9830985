use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("{resource} value {value} is outside the supported range [{min}, {max}]")]
    InvalidHardware {
        resource: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("insufficient RAM: requested {requested_mb} MB, {available_mb} MB available")]
    InsufficientMemory { requested_mb: u64, available_mb: u64 },

    #[error("invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("the kernel has not been booted")]
    NotBooted,

    #[error("the kernel is already running")]
    AlreadyBooted,

    #[error("boot was cancelled")]
    BootCancelled,

    #[error("boot stage '{stage}' failed: {reason}")]
    BootStageFailed { stage: String, reason: String },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

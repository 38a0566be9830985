use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use super::CancelToken;
use crate::error::{KernelError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootProgress {
    pub stage: String,
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootResult {
    pub success: bool,
    pub message: String,
}

impl BootResult {
    pub fn succeeded(message: impl Into<String>) -> BootResult {
        BootResult { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> BootResult {
        BootResult { success: false, message: message.into() }
    }
}

struct BootStage<'a> {
    name: String,
    action: Box<dyn FnOnce() -> Result<()> + 'a>,
}

/// Ordered, cancellable list of named start-up steps.
///
/// A failing stage stops the sequence; later stages never run. Cancellation is only
/// observed between stages.
pub struct BootSequence<'a> {
    stages: Vec<BootStage<'a>>,
    stage_delay: Duration,
}

impl<'a> BootSequence<'a> {
    pub fn new(stage_delay: Duration) -> BootSequence<'a> {
        BootSequence {
            stages: Vec::new(),
            stage_delay,
        }
    }

    pub fn stage(mut self, name: &str, action: impl FnOnce() -> Result<()> + 'a) -> BootSequence<'a> {
        self.stages.push(BootStage {
            name: name.to_string(),
            action: Box::new(action),
        });
        self
    }

    pub fn run(self, cancel: &CancelToken, observer: &mut dyn FnMut(&BootProgress)) -> BootResult {
        match self.run_stages(cancel, observer) {
            Ok(()) => {
                observer(&BootProgress {
                    stage: "Done".to_string(),
                    percent: 100,
                    message: "Boot complete".to_string(),
                });
                info!("boot complete");
                BootResult::succeeded("Boot complete")
            }
            Err(err) => {
                warn!("boot aborted: {}", err);
                BootResult::failed(err.to_string())
            }
        }
    }

    fn run_stages(self, cancel: &CancelToken, observer: &mut dyn FnMut(&BootProgress)) -> Result<()> {
        let total = self.stages.len().max(1);

        for (idx, stage) in self.stages.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(KernelError::BootCancelled);
            }

            let percent = (idx * 100 / total) as u8;
            info!("[{:>3}%] {}", percent, stage.name);
            observer(&BootProgress {
                stage: stage.name.clone(),
                percent,
                message: format!("{}...", stage.name),
            });

            (stage.action)().map_err(|err| KernelError::BootStageFailed {
                stage: stage.name.clone(),
                reason: err.to_string(),
            })?;

            if !self.stage_delay.is_zero() && !cancel.sleep(self.stage_delay) {
                return Err(KernelError::BootCancelled);
            }
        }

        if cancel.is_cancelled() {
            return Err(KernelError::BootCancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_boot_sequence_runs_stages_in_order() {
        let order = RefCell::new(Vec::new());
        let mut reports = Vec::new();

        let result = BootSequence::new(Duration::ZERO)
            .stage("first", || {
                order.borrow_mut().push(1);
                Ok(())
            })
            .stage("second", || {
                order.borrow_mut().push(2);
                Ok(())
            })
            .run(&CancelToken::new(), &mut |progress| reports.push(progress.clone()));

        assert!(result.success);
        assert_eq!(*order.borrow(), vec![1, 2]);

        let percents: Vec<u8> = reports.iter().map(|progress| progress.percent).collect();
        assert_eq!(percents, vec![0, 50, 100]);
        assert_eq!(reports[1].stage, "second");
    }

    #[test]
    fn test_boot_sequence_failure_skips_remaining_stages() {
        let reached = RefCell::new(false);

        let result = BootSequence::new(Duration::ZERO)
            .stage("broken", || Err(KernelError::NotBooted))
            .stage("never", || {
                *reached.borrow_mut() = true;
                Ok(())
            })
            .run(&CancelToken::new(), &mut |_| {});

        assert!(!result.success);
        assert!(result.message.contains("broken"));
        assert!(!*reached.borrow());
    }

    #[test]
    fn test_boot_sequence_cancelled_between_stages() {
        let cancel = CancelToken::new();
        let reached = RefCell::new(false);

        let result = BootSequence::new(Duration::ZERO)
            .stage("cancels", || {
                cancel.cancel();
                Ok(())
            })
            .stage("never", || {
                *reached.borrow_mut() = true;
                Ok(())
            })
            .run(&cancel, &mut |_| {});

        assert!(!result.success);
        assert_eq!(result.message, KernelError::BootCancelled.to_string());
        assert!(!*reached.borrow());
    }

    #[test]
    fn test_boot_sequence_percent_is_monotonic() {
        let mut sequence = BootSequence::new(Duration::ZERO);
        for _ in 0..7 {
            sequence = sequence.stage("step", || Ok(()));
        }
        let mut last = None;

        let result = sequence.run(&CancelToken::new(), &mut |progress| {
            if let Some(previous) = last {
                assert!(progress.percent > previous);
            }
            last = Some(progress.percent);
        });

        assert!(result.success);
        assert_eq!(last, Some(100));
    }
}

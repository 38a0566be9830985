use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};

use super::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    User,
    Kernel,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::User => f.pad("User"),
            Mode::Kernel => f.pad("Kernel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub old: Mode,
    pub new: Mode,
}

/// The privileged/unprivileged flag.
///
/// The gate never intercepts calls itself. Privileged entry points receive
/// `is_privileged()` from their caller and must check it before mutating anything.
pub struct ModeGate {
    mode: Mutex<Mode>,
    observers: Mutex<Vec<Sender<ModeChange>>>,
}

impl ModeGate {
    pub fn new() -> ModeGate {
        ModeGate {
            mode: Mutex::new(Mode::User),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Mode {
        *lock(&self.mode)
    }

    pub fn is_privileged(&self) -> bool {
        self.current() == Mode::Kernel
    }

    /// Switches to `new_mode`. Returns false, and notifies nobody, if it was already active.
    pub fn switch(&self, new_mode: Mode) -> bool {
        let change = {
            let mut mode = lock(&self.mode);
            if *mode == new_mode {
                return false;
            }
            let change = ModeChange { old: *mode, new: new_mode };
            *mode = new_mode;
            change
        };

        info!("mode switched from {} to {}", change.old, change.new);

        // Receivers that have gone away are dropped from the list.
        lock(&self.observers).retain(|observer| observer.send(change).is_ok());
        true
    }

    pub fn subscribe(&self) -> Receiver<ModeChange> {
        let (sender, receiver) = mpsc::channel();
        lock(&self.observers).push(sender);
        receiver
    }
}

impl Default for ModeGate {
    fn default() -> ModeGate {
        ModeGate::new()
    }
}

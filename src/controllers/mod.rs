//! Output controllers: the pluggable seam between dispatched actions and
//! the operating system.

pub mod keyboard;
pub mod pointer;
pub mod shell;
pub mod window;

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::action::{ActionCommand, ActionParams, ControllerKind};

#[derive(Debug)]
pub enum ControllerError {
    /// No controller is registered (or it failed to initialize) for the
    /// action's kind.
    Unavailable(ControllerKind),
    /// A spawned command outlived its deadline and was killed.
    Timeout { seconds: u64 },
    /// The controller ran and failed.
    Execution(String),
    /// The command variant is not one this controller handles.
    Unsupported { kind: ControllerKind },
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Unavailable(kind) => {
                write!(f, "{} controller unavailable", kind)
            }
            ControllerError::Timeout { seconds } => {
                write!(f, "command timed out after {}s", seconds)
            }
            ControllerError::Execution(msg) => write!(f, "execution failed: {}", msg),
            ControllerError::Unsupported { kind } => {
                write!(f, "command not supported by {} controller", kind)
            }
        }
    }
}

impl Error for ControllerError {}

pub trait Controller: Send {
    fn execute(
        &mut self,
        command: &ActionCommand,
        params: &ActionParams,
    ) -> Result<String, ControllerError>;

    /// Release anything physically held (buttons, keys). Must be safe to
    /// call more than once.
    fn release_all(&mut self) {}
}

/// Each controller sits behind its own mutex, so locking is per device:
/// a shell command grinding away on the consumer thread never delays a
/// pointer or keyboard action dispatched concurrently.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: HashMap<ControllerKind, Mutex<Box<dyn Controller>>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ControllerKind, controller: Box<dyn Controller>) {
        self.controllers.insert(kind, Mutex::new(controller));
    }

    /// Lock one controller for execution. A poisoned lock (a previous
    /// panic was already contained at the dispatch boundary) is reclaimed.
    pub fn lock(&self, kind: ControllerKind) -> Option<MutexGuard<'_, Box<dyn Controller>>> {
        let slot = self.controllers.get(&kind)?;
        Some(match slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        })
    }

    pub fn available(&self, kind: ControllerKind) -> bool {
        self.controllers.contains_key(&kind)
    }

    pub fn release_all(&self) {
        for slot in self.controllers.values() {
            let mut controller = match slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            controller.release_all();
        }
    }
}

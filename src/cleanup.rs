//! The per-pipeline cleanup registry: a LIFO stack of named undo actions
//! Preserves insertion order,
//! runs actions in reverse on failure, and never short-circuits on an
//! individual failure — secondary errors are logged and the unwind
//! continues. Thread-affine: only the pipeline task that built it should
//! ever run or transfer it.

use anyhow::Result;
use log::warn;

type Action = Box<dyn FnOnce() -> Result<()> + Send>;

/// An ordered list of (description, undo action) pairs.
#[derive(Default)]
pub struct Cleanup {
    actions: Vec<(String, Action)>,
}

impl Cleanup {
    /// A new, empty cleanup list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an undo action. Pushed actions run in reverse of
    /// registration order.
    pub fn push(&mut self, description: impl Into<String>, action: impl FnOnce() -> Result<()> + Send + 'static) {
        self.actions.push((description.into(), Box::new(action)));
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether any actions are registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in reverse order. Failures are logged and do not
    /// stop the unwind, and do not propagate — this is only ever called
    /// when the pipeline has already failed and the original error is
    /// what the caller receives.
    pub fn run(self) {
        for (description, action) in self.actions.into_iter().rev() {
            if let Err(e) = action() {
                warn!("cleanup action {:?} failed: {:#}", description, e);
            }
        }
    }
}

//! Cancellation for a provisioning run.
//!
//! The surrounding build (or the CLI's Ctrl-C handler) holds a clone of the
//! token and trips it; the fetcher and orchestrator poll it between steps and
//! from the transfer progress callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error returned when a run is stopped by an abort request.
#[derive(Debug)]
pub struct RunAborted;

impl std::fmt::Display for RunAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "provisioning aborted")
    }
}

impl std::error::Error for RunAborted {}

/// Shared abort flag. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is aborted when either it or `self` is. Aborting the child
    /// leaves `self` untouched.
    pub fn child(&self) -> AbortToken {
        AbortToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn request_abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::Relaxed))
    }

    /// `Err(RunAborted)` once abort has been requested.
    pub fn check(&self) -> Result<(), RunAborted> {
        if self.is_aborted() {
            Err(RunAborted)
        } else {
            Ok(())
        }
    }
}

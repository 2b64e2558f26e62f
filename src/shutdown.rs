//! Cooperative shutdown signal shared by every role.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{MatsyaError, Result};

/// Cloneable stop flag. All clones observe the same signal.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal shutdown.
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if shutdown is signaled.
    pub fn is_signaled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raise this flag on SIGINT or SIGTERM. Only one handler may be
    /// installed per process.
    pub fn on_interrupt(&self) -> Result<()> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Received shutdown signal");
            shutdown.signal();
        })
        .map_err(|e| MatsyaError::Signal(format!("Error setting Ctrl-C handler: {}", e)))
    }
}

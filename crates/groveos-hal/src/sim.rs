//! In-process simulation driver for headless runs and CI.
//!
//! [`SimRelayDriver`] records every write instead of touching hardware, so
//! the full GroveOS stack can run in tests and on development machines with
//! no GPIO attached.

use std::sync::{Arc, Mutex};

use groveos_types::GroveError;
use tracing::debug;

use crate::relay::RelayDriver;

/// A recording stub relay driver. Always succeeds.
pub struct SimRelayDriver {
    log: Arc<Mutex<Vec<(u8, bool)>>>,
}

impl SimRelayDriver {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the recorded `(pin, state)` writes.
    pub fn log(&self) -> Arc<Mutex<Vec<(u8, bool)>>> {
        Arc::clone(&self.log)
    }
}

impl Default for SimRelayDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayDriver for SimRelayDriver {
    fn write(&mut self, pin: u8, on: bool) -> Result<(), GroveError> {
        debug!(pin, on, "sim relay write");
        if let Ok(mut log) = self.log.lock() {
            log.push((pin, on));
        }
        Ok(())
    }
}

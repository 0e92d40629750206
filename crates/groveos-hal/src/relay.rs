//! [`Relay`] – a single named on/off device, plus the [`RelayDriver`]
//! write-through seam.

use groveos_types::GroveError;
use tracing::{error, info};

/// Write-through hook onto physical hardware (GPIO expander, shift register,
/// …). Implementations must not block for long; the control loop is
/// cooperative.
pub trait RelayDriver: Send {
    /// Drive the output at `pin` to `on`.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::Hardware`] when the output cannot be applied.
    fn write(&mut self, pin: u8, on: bool) -> Result<(), GroveError>;
}

/// One named relay. The `state` field is the source of truth for the rest of
/// the system; driver failures are logged but do not roll the state back,
/// matching the degrade-gracefully policy for transport faults.
pub struct Relay {
    name: String,
    pin: u8,
    state: bool,
}

impl Relay {
    /// Create a relay in the de-energised state.
    pub fn new(name: impl Into<String>, pin: u8) -> Self {
        Self {
            name: name.into(),
            pin,
            state: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Current logical state (`true` = energised).
    pub fn state(&self) -> bool {
        self.state
    }

    /// Set the relay state, optionally mirroring it through `driver`.
    ///
    /// This is the sole write path for relay state. Returns the new state.
    pub fn set_state(&mut self, on: bool, driver: Option<&mut (dyn RelayDriver + 'static)>) -> bool {
        self.state = on;
        if let Some(driver) = driver {
            if let Err(e) = driver.write(self.pin, on) {
                error!(relay = %self.name, pin = self.pin, error = %e, "relay driver write failed");
            }
        }
        info!(relay = %self.name, pin = self.pin, on, "relay switched");
        self.state
    }
}

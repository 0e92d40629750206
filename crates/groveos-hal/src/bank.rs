//! [`ActuatorBank`] – the named relay registry.
//!
//! A pure state store. It is only ever touched from the single-threaded
//! control context, so no locking is needed; mirroring switches onto the
//! serial channel (and recording them in the command cache) is the caller's
//! concern.

use std::collections::BTreeMap;

use groveos_types::GroveError;
use tracing::info;

use crate::relay::{Relay, RelayDriver};

/// Default pin assignments, matching the reference greenhouse wiring.
pub const DEFAULT_PINS: [(&str, u8); 3] = [("light", 7), ("fan", 8), ("pump", 10)];

/// Named relay registry with an optional shared write-through driver.
pub struct ActuatorBank {
    relays: BTreeMap<String, Relay>,
    driver: Option<Box<dyn RelayDriver>>,
}

impl ActuatorBank {
    /// Build a bank from a name→pin mapping, all relays off.
    pub fn new<'a>(pins: impl IntoIterator<Item = (&'a str, u8)>) -> Self {
        let relays = pins
            .into_iter()
            .map(|(name, pin)| (name.to_string(), Relay::new(name, pin)))
            .collect();
        Self {
            relays,
            driver: None,
        }
    }

    /// Bank with the default greenhouse wiring (`light`, `fan`, `pump`).
    pub fn with_default_pins() -> Self {
        Self::new(DEFAULT_PINS)
    }

    /// Attach a write-through driver applied on every subsequent `set`.
    pub fn with_driver(mut self, driver: Box<dyn RelayDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set a named relay and return its new state.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::Hardware`] when `name` is not a registered
    /// actuator.
    pub fn set(&mut self, name: &str, on: bool) -> Result<bool, GroveError> {
        let relay = self.relays.get_mut(name).ok_or_else(|| GroveError::Hardware {
            component: name.to_string(),
            details: format!("actuator '{name}' is not registered"),
        })?;
        Ok(relay.set_state(on, self.driver.as_deref_mut()))
    }

    /// Snapshot of every relay's logical state.
    pub fn states(&self) -> BTreeMap<String, bool> {
        self.relays
            .iter()
            .map(|(name, relay)| (name.clone(), relay.state()))
            .collect()
    }

    /// `true` if `name` is a registered actuator.
    pub fn contains(&self, name: &str) -> bool {
        self.relays.contains_key(name)
    }

    /// Switch every relay off and return the resulting state mapping.
    pub fn shutdown_all(&mut self) -> BTreeMap<String, bool> {
        info!("shutting down all actuators");
        let names: Vec<String> = self.relays.keys().cloned().collect();
        for name in names {
            // Registered names cannot fail the lookup.
            let _ = self.set(&name, false);
        }
        self.states()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_states_reflects_value() {
        let mut bank = ActuatorBank::with_default_pins();
        for name in ["light", "fan", "pump"] {
            assert!(bank.set(name, true).unwrap());
            assert_eq!(bank.states()[name], true);
            assert!(!bank.set(name, false).unwrap());
            assert_eq!(bank.states()[name], false);
        }
    }

    #[test]
    fn unknown_actuator_is_an_error() {
        let mut bank = ActuatorBank::with_default_pins();
        let result = bank.set("heater", true);
        assert!(matches!(result, Err(GroveError::Hardware { .. })));
    }

    #[test]
    fn shutdown_all_turns_everything_off() {
        let mut bank = ActuatorBank::with_default_pins();
        bank.set("light", true).unwrap();
        bank.set("pump", true).unwrap();

        let states = bank.shutdown_all();
        assert!(states.values().all(|on| !on));
        assert_eq!(states.len(), 3);
    }

    #[test]
    fn custom_pin_mapping() {
        let mut bank = ActuatorBank::new([("light", 1), ("fan", 2), ("pump", 3)]);
        assert!(bank.set("fan", true).unwrap());
        assert_eq!(bank.states()["fan"], true);
    }

    #[test]
    fn write_through_driver_sees_every_set() {
        use crate::sim::SimRelayDriver;

        let driver = SimRelayDriver::new();
        let log = driver.log();
        let mut bank = ActuatorBank::new([("light", 1), ("fan", 2), ("pump", 3)])
            .with_driver(Box::new(driver));

        bank.set("light", true).unwrap();
        bank.set("pump", true).unwrap();
        bank.shutdown_all();

        let writes = log.lock().unwrap();
        assert_eq!(writes[0], (1, true));
        assert_eq!(writes[1], (3, true));
        // shutdown_all writes all three pins off.
        assert_eq!(writes.len(), 5);
        assert!(writes[2..].iter().all(|(_, on)| !on));
    }
}

//! `groveos-hal` – actuator state and command audit
//!
//! The hardware-facing state layer of the GroveOS core. It holds no I/O of
//! its own: relays are pure state with an optional write-through driver, and
//! mirroring commands onto the serial channel is the orchestrator's concern.
//!
//! # Modules
//!
//! - [`relay`] – [`Relay`][relay::Relay]: a single named on/off device with
//!   an optional [`RelayDriver`][relay::RelayDriver] write-through hook.
//! - [`bank`] – [`ActuatorBank`][bank::ActuatorBank]: the named relay
//!   registry (`light`, `fan`, `pump`) with `set` / `states` /
//!   `shutdown_all`.
//! - [`cache`] – [`CommandCache`][cache::CommandCache]: bounded FIFO ring of
//!   the most recently issued device commands, kept for audit endpoints.
//! - [`sim`] – [`SimRelayDriver`][sim::SimRelayDriver]: a recording stub
//!   driver so the full stack runs headless in tests and CI.

pub mod bank;
pub mod cache;
pub mod relay;
pub mod sim;

pub use bank::{ActuatorBank, DEFAULT_PINS};
pub use cache::CommandCache;
pub use relay::{Relay, RelayDriver};
pub use sim::SimRelayDriver;

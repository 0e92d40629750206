//! `groveos-middleware` – the nervous system
//!
//! Routes asynchronous traffic between the control core and external
//! clients over MQTT without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`routing`] – topic layout under the configured prefix and pure
//!   payload-to-message parsing for the two inbound lanes.
//! - [`bus`] – [`MqttBus`][bus::MqttBus]: connection management, automatic
//!   re-subscription after reconnects, and inbound dispatch into an
//!   [`InboundHandler`][bus::InboundHandler].
//! - [`sink`] – the [`StatusSink`][sink::StatusSink] seam the control core
//!   publishes status snapshots and categorised log events through.

pub mod bus;
pub mod routing;
pub mod sink;

pub use bus::{BusConfig, InboundHandler, MqttBus};
pub use routing::{BusInbound, parse_inbound};
pub use sink::StatusSink;

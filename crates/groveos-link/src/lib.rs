//! `groveos-link` – the serial command channel
//!
//! Line-oriented JSON protocol between the GroveOS core and the
//! microcontroller that drives the arm and reports low-level faults.
//!
//! # Wire format
//!
//! Outbound, one JSON object per line:
//!
//! ```json
//! {"seq": 1718000000123, "cmd": {"pump": true}}
//! ```
//!
//! Inbound acknowledgement lines are free-form text with a prefix
//! convention: `OK ...` and `ERR ...` are terminal markers, `READY` is the
//! boot line the microcontroller emits once its reset is complete.
//!
//! # Modules
//!
//! - [`codec`] – frame encoding and ack-line classification.
//! - [`channel`] – [`SerialLink`][channel::SerialLink]: boot handshake,
//!   bounded-time ack collection, monotonic sequence numbers; plus the
//!   [`CommandPort`][channel::CommandPort] seam the orchestrator holds.
//! - [`port`] – opening the physical serial device via `tokio-serial`.

pub mod channel;
pub mod codec;
pub mod port;

pub use channel::{AckReport, CommandPort, LinkConfig, SerialLink};
pub use codec::{AckKind, AckStatus, CommandFrame, MAX_ACK_LINES};
pub use port::open_port;

//! `groveos-runtime` – the control core
//!
//! The execution engine: a single-threaded cooperative control loop that
//! owns every piece of mutable device state and arbitrates between local
//! rule-based automation and externally proposed, human-approved actions.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: the
//!   control loop itself (safety-gated scheduler tick, decision-approval
//!   state machine, emergency handling) plus
//!   [`ControlHandle`][orchestrator::ControlHandle], the only way other
//!   tasks reach the loop.
//! - [`schedule`] – [`IrrigationSchedule`][schedule::IrrigationSchedule]:
//!   wall-clock `HH:MM` entries that fire at most once per calendar day.
//! - [`collab`] – seams for the out-of-scope subsystems the core merely
//!   consumes: sensor acquisition, the remote decision authority, and the
//!   camera.
//! - [`coordinator`] – [`CoordinatorClient`][coordinator::CoordinatorClient]:
//!   HTTP client for the remote decision authority.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with env-filter and an optional JSON formatter.

pub mod collab;
pub mod coordinator;
pub mod orchestrator;
pub mod schedule;
pub mod telemetry;

pub use collab::{DecisionService, FrameSource, SensorHub, SimSensorHub};
pub use coordinator::CoordinatorClient;
pub use orchestrator::{ControlEvent, ControlHandle, Orchestrator, OrchestratorConfig};
pub use schedule::{IrrigationSchedule, ScheduleEntry};
pub use telemetry::init_tracing;

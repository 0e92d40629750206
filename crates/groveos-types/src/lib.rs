//! `groveos-types` – shared data model for the GroveOS device core.
//!
//! Everything that crosses a crate boundary lives here: the decision action
//! vocabulary, the bus message shapes, the command-cache entry, status and
//! health reports, and the global [`GroveError`] type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Strict vocabulary of actions an externally proposed decision may request.
///
/// Decoded exactly once at the bus boundary (see [`DecisionMsg::action`]);
/// everything downstream matches on this enum instead of re-inspecting raw
/// JSON. Anything outside the vocabulary lands in
/// [`DeviceAction::Unrecognized`] and is dropped with a log, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceAction {
    /// Switch the grow light relay.
    SetLight { on: bool },
    /// Switch the ventilation fan relay.
    SetFan { on: bool },
    /// Switch the irrigation pump relay.
    SetPump { on: bool },
    /// Run the pump for a bounded burst, then switch it off again.
    RunPump { duration_secs: u64 },
    /// Safety interlock: all actuators off, serial stop command, flag set.
    EmergencyStop,
    /// Anything outside the vocabulary; carries the raw action label.
    Unrecognized { raw: String },
}

/// Inbound payload on the `decisions` bus topic.
///
/// The decision authority is loose about field names: the action label may
/// arrive as `action`, `cmd`, or `name`, and the switch/duration parameters
/// may sit at the top level or inside a nested `payload` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, alias = "cmd", alias = "name")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl DecisionMsg {
    /// Decode this message into the fixed [`DeviceAction`] vocabulary.
    ///
    /// Resolution order for parameters: top-level field first, then the same
    /// key inside `payload`. A `pump` request with a duration but no switch
    /// flag means "run for N seconds".
    pub fn action(&self) -> DeviceAction {
        let label = self
            .action
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let on = self.on.or_else(|| self.payload_bool("on"));
        let duration = self
            .duration
            .or_else(|| self.payload_f64("duration"))
            .filter(|d| d.is_finite() && *d >= 0.0);

        match label.as_str() {
            "light" => match on {
                Some(on) => DeviceAction::SetLight { on },
                None => DeviceAction::Unrecognized { raw: label },
            },
            "fan" => match on {
                Some(on) => DeviceAction::SetFan { on },
                None => DeviceAction::Unrecognized { raw: label },
            },
            "pump" => match (on, duration) {
                (Some(on), _) => DeviceAction::SetPump { on },
                (None, Some(secs)) => DeviceAction::RunPump {
                    duration_secs: secs.round() as u64,
                },
                (None, None) => DeviceAction::Unrecognized { raw: label },
            },
            "emergency_stop" | "emergency-stop" | "estop" => DeviceAction::EmergencyStop,
            _ => DeviceAction::Unrecognized { raw: label },
        }
    }

    fn payload_bool(&self, key: &str) -> Option<bool> {
        self.payload.as_ref()?.get(key)?.as_bool()
    }

    fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.as_ref()?.get(key)?.as_f64()
    }
}

/// Inbound payload on the `approvals` bus topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalMsg {
    /// Id of the decision being resolved. An approval without one cannot
    /// be correlated and is dropped at the control boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ApprovalMsg {
    /// Derive the approval verdict.
    ///
    /// An explicit `approved` flag wins; otherwise the `status` string is
    /// consulted (`"approved"` / `"rejected"`). Any other status yields
    /// `None` and must leave the pending decision untouched.
    pub fn verdict(&self) -> Option<bool> {
        if let Some(flag) = self.approved {
            return Some(flag);
        }
        match self.status.as_deref() {
            Some("approved") => Some(true),
            Some("rejected") => Some(false),
            _ => None,
        }
    }
}

/// Lifecycle of an externally proposed decision.
///
/// `Pending` is the only non-terminal state; the three terminal states are
/// never left once entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Approved,
    Rejected,
    TimedOut,
}

/// One entry in the bounded command cache: a command the core actually
/// issued, kept for audit/inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Logical target, e.g. `"pump"` or `"arm"`.
    pub name: String,
    /// The command body as issued (relay state, joint angles, …).
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Periodic snapshot published upstream after each scheduler tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Flat mapping of named sensor values; a failed read is represented as
    /// an embedded `"error"` entry rather than an absent report.
    pub sensors: serde_json::Map<String, Value>,
    pub actuators: BTreeMap<String, bool>,
}

/// Liveness summary exposed to transport-layer callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub serial_open: bool,
    pub bus_connected: bool,
    pub emergency: bool,
    pub cache_size: usize,
}

/// Per-event log lanes published alongside the status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Camera,
    Llm,
    Robot,
    Error,
}

impl LogCategory {
    /// Topic suffix for this lane.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Camera => "camera",
            LogCategory::Llm => "llm",
            LogCategory::Robot => "robot",
            LogCategory::Error => "error",
        }
    }
}

/// Global error type spanning hardware faults, transport faults, and
/// collaborator failures.
///
/// Variants carry strings rather than source errors so the type stays
/// serializable end to end (error reports travel over the bus).
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GroveError {
    #[error("Hardware fault on {component}: {details}")]
    Hardware { component: String, details: String },

    #[error("Serial channel error: {0}")]
    Serial(String),

    #[error("Control channel error: {0}")]
    Channel(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Config error: {0}")]
    Config(String),
}

//! Frame encoding and acknowledgement-line classification.

use groveos_types::GroveError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal-success prefix on inbound ack lines.
pub const OK_PREFIX: &str = "OK";
/// Terminal-failure prefix on inbound ack lines.
pub const ERR_PREFIX: &str = "ERR";
/// Boot line emitted once the microcontroller finishes its reset.
pub const READY_LINE: &str = "READY";
/// Ack collection stops after this many non-empty lines even without a
/// terminal marker.
pub const MAX_ACK_LINES: usize = 5;

/// One outbound command frame. `seq` is a millisecond timestamp forced
/// monotonically increasing by the channel, used for correlation in device
/// logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    pub seq: u64,
    pub cmd: Value,
}

impl CommandFrame {
    /// Encode as a single newline-terminated line.
    pub fn encode(&self) -> Result<String, GroveError> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| GroveError::Serial(format!("frame encode failed: {e}")))?;
        line.push('\n');
        Ok(line)
    }
}

/// Classification of a single inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Terminal success (`OK ...`).
    Ok,
    /// Terminal failure (`ERR ...`).
    Err,
    /// Boot line (`READY`).
    Ready,
    /// Anything else; collected but not terminal.
    Info,
}

/// Classify a trimmed inbound line by its prefix convention.
pub fn classify(line: &str) -> AckKind {
    let line = line.trim();
    if line == READY_LINE {
        AckKind::Ready
    } else if line.starts_with(OK_PREFIX) {
        AckKind::Ok
    } else if line.starts_with(ERR_PREFIX) {
        AckKind::Err
    } else {
        AckKind::Info
    }
}

/// Outcome of one `write_command` ack-collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// A terminal-success line was seen.
    Ok,
    /// A terminal-failure line was seen.
    Error,
    /// The window elapsed (or the line cap was hit) with no terminal line.
    Timeout,
}

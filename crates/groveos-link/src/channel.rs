//! [`SerialLink`] – boot handshake and acknowledged command writes.
//!
//! The microcontroller resets when the channel opens and emits noise before
//! its `READY` line, so the link purges already-buffered input once before
//! the handshake. Command writes are followed by a bounded ack-collection
//! window: inbound lines are polled at a fixed interval and collected until
//! a terminal `OK`/`ERR` marker, the line cap, or the timeout.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf,
    WriteHalf};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use groveos_types::GroveError;

use crate::codec::{AckKind, AckStatus, CommandFrame, MAX_ACK_LINES, classify};

/// Timing knobs for the serial channel.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long a command write waits for its acknowledgement lines.
    pub ack_timeout: Duration,
    /// Fixed poll interval for non-blocking reads inside the ack window.
    pub poll_interval: Duration,
    /// How long the boot handshake waits for the `READY` line.
    pub startup_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(750),
            poll_interval: Duration::from_millis(50),
            startup_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of one acknowledged command write.
#[derive(Debug, Clone)]
pub struct AckReport {
    pub bytes_written: usize,
    /// Non-empty response lines collected inside the window, in arrival
    /// order, including the terminal line when one was seen.
    pub lines: Vec<String>,
    pub status: AckStatus,
}

/// The seam the orchestrator holds onto the microcontroller. Implemented by
/// [`SerialLink`] for real hardware and by in-memory doubles in tests.
#[async_trait]
pub trait CommandPort: Send {
    /// Frame, write, flush, and collect acknowledgement lines.
    async fn write_command(&mut self, cmd: Value) -> Result<AckReport, GroveError>;

    /// `false` once the channel has seen a fatal transport fault.
    fn is_open(&self) -> bool;
}

/// Line-oriented serial command channel over any async byte transport.
pub struct SerialLink<T> {
    lines: Lines<BufReader<ReadHalf<T>>>,
    writer: WriteHalf<T>,
    cfg: LinkConfig,
    last_seq: u64,
    degraded: bool,
}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialLink<T> {
    /// Wrap an already-open transport.
    pub fn new(transport: T, cfg: LinkConfig) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            cfg,
            last_seq: 0,
            degraded: false,
        }
    }

    /// Millisecond-timestamp sequence numbers, forced strictly increasing so
    /// rapid writes within one millisecond still correlate unambiguously.
    fn next_seq(&mut self) -> u64 {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let seq = now_ms.max(self.last_seq + 1);
        self.last_seq = seq;
        seq
    }

    /// Discard whatever input is already buffered.
    ///
    /// The microcontroller resets on channel open and emits noise that must
    /// not be mistaken for an acknowledgement.
    pub async fn purge_input(&mut self) {
        loop {
            match timeout(self.cfg.poll_interval, self.lines.next_line()).await {
                Ok(Ok(Some(line))) => debug!(line = %line.trim(), "purged boot noise"),
                // EOF, read error, or silence: nothing left to discard.
                Ok(_) | Err(_) => break,
            }
        }
    }

    /// Boot handshake: purge once, then wait up to `startup_timeout` for the
    /// `READY` line.
    ///
    /// Returns `true` when the device reported ready. Absence of the line is
    /// logged as a warning but the channel stays usable; the device may
    /// still accept commands.
    pub async fn handshake(&mut self) -> bool {
        self.purge_input().await;

        let deadline = Instant::now() + self.cfg.startup_timeout;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let window = remaining.min(self.cfg.poll_interval);
            match timeout(window, self.lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if classify(&line) == AckKind::Ready {
                        info!("microcontroller reported READY");
                        return true;
                    }
                    debug!(line = %line.trim(), "boot noise before READY");
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => debug!(error = %e, "transient read error during handshake"),
                Err(_) => {} // poll window elapsed; keep waiting
            }
        }
        warn!(
            timeout_ms = self.cfg.startup_timeout.as_millis() as u64,
            "no READY line from microcontroller; continuing degraded"
        );
        false
    }

    /// Collect acknowledgement lines until a terminal marker, the line cap,
    /// or the deadline.
    async fn collect_acks(&mut self) -> (Vec<String>, AckStatus) {
        let deadline = Instant::now() + self.cfg.ack_timeout;
        let mut lines = Vec::new();

        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let window = remaining.min(self.cfg.poll_interval);
            match timeout(window, self.lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    lines.push(trimmed.to_string());
                    match classify(trimmed) {
                        AckKind::Ok => return (lines, AckStatus::Ok),
                        AckKind::Err => return (lines, AckStatus::Error),
                        AckKind::Ready | AckKind::Info => {}
                    }
                    if lines.len() >= MAX_ACK_LINES {
                        debug!(cap = MAX_ACK_LINES, "ack line cap reached without terminal marker");
                        break;
                    }
                }
                Ok(Ok(None)) => {
                    debug!("serial channel closed while waiting for ack");
                    self.degraded = true;
                    break;
                }
                // Transient read faults are logged, never raised.
                Ok(Err(e)) => debug!(error = %e, "transient read error during ack wait"),
                Err(_) => {} // poll window elapsed; retry until deadline
            }
        }
        (lines, AckStatus::Timeout)
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send + Unpin> CommandPort for SerialLink<T> {
    async fn write_command(&mut self, cmd: Value) -> Result<AckReport, GroveError> {
        let frame = CommandFrame {
            seq: self.next_seq(),
            cmd,
        };
        let line = frame.encode()?;

        if let Err(e) = self.writer.write_all(line.as_bytes()).await {
            self.degraded = true;
            return Err(GroveError::Serial(format!("write failed: {e}")));
        }
        if let Err(e) = self.writer.flush().await {
            self.degraded = true;
            return Err(GroveError::Serial(format!("flush failed: {e}")));
        }

        let (lines, status) = self.collect_acks().await;
        debug!(seq = frame.seq, ?status, lines = lines.len(), "command acknowledged");
        Ok(AckReport {
            bytes_written: line.len(),
            lines,
            status,
        })
    }

    fn is_open(&self) -> bool {
        !self.degraded
    }
}

//! GroveOS daemon entry point.
//!
//! Wires the serial channel, actuator bank, MQTT bus, and control loop
//! together from `groveos.toml` (path as the first argument) and runs until
//! SIGINT. Shutdown triggers an emergency stop through the control handle
//! and awaits the control task before reporting stopped.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::{error, info, warn};

use groveos_hal::{ActuatorBank, CommandCache, SimRelayDriver};
use groveos_link::{CommandPort, LinkConfig, SerialLink, open_port};
use groveos_middleware::{BusConfig, MqttBus, StatusSink};
use groveos_runtime::{
    ControlHandle, CoordinatorClient, DecisionService, IrrigationSchedule, Orchestrator,
    OrchestratorConfig, ScheduleEntry, SensorHub, SimSensorHub, init_tracing,
};
use groveos_types::{GroveError, LogCategory, StatusSnapshot};

use config::Config;

/// Sink used when the bus is disabled: publishes go nowhere.
struct NullSink;

#[async_trait]
impl StatusSink for NullSink {
    async fn publish_status(&self, _snapshot: &StatusSnapshot) -> Result<(), GroveError> {
        Ok(())
    }

    async fn log_event(&self, _category: LogCategory, _data: Value) -> Result<(), GroveError> {
        Ok(())
    }

    fn connected(&self) -> bool {
        false
    }
}

/// Loopback serial stand-in for `sim = true`: announces `READY`, then
/// acknowledges every frame with `OK`.
fn sim_port(cfg: LinkConfig) -> SerialLink<DuplexStream> {
    let (near, far) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(far);
        if writer.write_all(b"READY\n").await.is_err() {
            return;
        }
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if writer.write_all(b"OK\n").await.is_err() {
                break;
            }
        }
    });
    SerialLink::new(near, cfg)
}

#[tokio::main]
async fn main() -> Result<(), GroveError> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("groveos.toml"));
    let cfg = Config::load(&config_path)?;
    info!(path = %config_path.display(), sim = cfg.sim, "configuration loaded");

    let link_cfg = LinkConfig {
        ack_timeout: Duration::from_millis(cfg.serial.ack_timeout_ms),
        poll_interval: Duration::from_millis(cfg.serial.poll_interval_ms),
        startup_timeout: Duration::from_millis(cfg.serial.startup_timeout_ms),
    };

    // Channel open failure on real hardware is the one fatal startup error.
    let port: Box<dyn CommandPort> = if cfg.sim {
        let mut link = sim_port(link_cfg);
        link.handshake().await;
        Box::new(link)
    } else {
        let mut link = open_port(&cfg.serial.device, cfg.serial.baud, link_cfg)?;
        link.handshake().await;
        Box::new(link)
    };

    let pins = cfg.pins.iter().map(|(name, pin)| (name.as_str(), *pin));
    let bank = if cfg.sim {
        ActuatorBank::new(pins).with_driver(Box::new(SimRelayDriver::default()))
    } else {
        ActuatorBank::new(pins)
    };

    // No hardware sensor hub is wired yet; outside sim mode that must be
    // unmissable in the logs, since published readings are synthetic and
    // the humidity rule would act on constants.
    if !cfg.sim {
        warn!(
            "no hardware sensor hub configured; sensor readings are SIMULATED \
             and humidity automation runs on fixed values"
        );
    }
    let sensors: Box<dyn SensorHub> = Box::new(SimSensorHub::default());

    let advisor: Option<Box<dyn DecisionService>> = if cfg.coordinator_url.is_empty() {
        None
    } else {
        Some(Box::new(CoordinatorClient::new(&cfg.coordinator_url)?))
    };

    let schedule = IrrigationSchedule::new(
        cfg.irrigation
            .iter()
            .map(|e| ScheduleEntry::new(&e.at, e.duration_secs))
            .collect(),
    );

    let (handle, rx) = ControlHandle::channel();

    let (sink, bus_task): (Box<dyn StatusSink>, _) = if cfg.mqtt.enabled {
        let (bus, task) = MqttBus::connect(
            BusConfig {
                host: cfg.mqtt.host.clone(),
                port: cfg.mqtt.port,
                client_id: cfg.mqtt.client_id.clone(),
                prefix: cfg.mqtt.prefix.clone(),
                keep_alive: Duration::from_secs(cfg.mqtt.keep_alive_secs),
            },
            Arc::new(handle.clone()),
        );
        (Box::new(bus), Some(task))
    } else {
        warn!("mqtt disabled; running without a bus");
        (Box::new(NullSink), None)
    };

    let core = Orchestrator::new(
        bank,
        CommandCache::new(),
        port,
        sink,
        sensors,
        advisor,
        None,
        schedule,
        OrchestratorConfig {
            tick_interval: Duration::from_secs(cfg.control.tick_secs),
            humidity_threshold: cfg.control.humidity_threshold,
            pump_burst: Duration::from_secs(cfg.control.pump_burst_secs),
            approval_window: Duration::from_secs(cfg.control.approval_window_secs),
            decision_query_every: (cfg.control.decision_query_every > 0)
                .then_some(cfg.control.decision_query_every),
        },
        handle.clone(),
    );
    let control_task = tokio::spawn(core.run(rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "signal listener failed");
    }
    info!("SIGINT received; stopping");

    // Bring the device to rest, then drain the loop and wait for it. The
    // task's own cancellation outcome is swallowed; partial serial work is
    // not rolled back.
    if let Err(e) = handle.emergency_stop().await {
        warn!(error = %e, "emergency stop on shutdown failed");
    }
    let _ = handle.shutdown().await;
    let _ = control_task.await;
    if let Some(task) = bus_task {
        task.abort();
    }
    info!("stopped");
    Ok(())
}

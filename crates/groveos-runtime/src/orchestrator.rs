//! [`Orchestrator`] – the single-threaded control core.
//!
//! One cooperative task owns every piece of mutable device state: actuator
//! bank, command cache, pending-decision table, schedule stamps, and the
//! emergency flag. Everything else in the process reaches it through a
//! [`ControlHandle`], so registry and cache mutation need no locking.
//!
//! Each scheduler tick: if the emergency flag is set, do nothing (the flag
//! is monotonic; only a process restart clears it). Otherwise read the
//! sensors, run the humidity rule and the irrigation schedule through a
//! guarded pump helper that re-checks the flag immediately before acting,
//! and publish a status snapshot best-effort. A pump run switches the pump
//! on and arms an off deadline serviced by the run loop, so control events
//! stay live while the pump is on. Any error inside automation
//! is a safety fault: it trips the flag, shuts the bank down, and sends the
//! serial emergency-stop command.
//!
//! # Decision approval
//!
//! Externally proposed decisions arrive over the bus and wait for a human
//! verdict. Arrival inserts a pending entry holding a one-shot resolver and
//! spawns a waiter that races the resolver against the approval window; the
//! waiter reports the outcome back into the control channel, so the table
//! itself is only ever touched by the control task. The first verdict takes
//! the resolver; later verdicts and unknown ids are no-ops, and a verdict
//! landing after the window finds the resolver's receiver gone and nothing
//! is dispatched.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use groveos_hal::{ActuatorBank, CommandCache};
use groveos_link::{AckReport, CommandPort};
use groveos_middleware::{InboundHandler, StatusSink};
use groveos_types::{
    ApprovalMsg, DecisionMsg, DecisionStatus, DeviceAction, DeviceCommand, GroveError,
    HealthReport, LogCategory, StatusSnapshot,
};

use crate::collab::{DecisionService, FrameSource, SensorHub};
use crate::schedule::IrrigationSchedule;

/// Capacity of the control channel. Bus callbacks shed load here rather
/// than block the network task.
const CONTROL_CHANNEL_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning knobs for the control loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Scheduler tick interval.
    pub tick_interval: Duration,
    /// Relative humidity below this triggers a pump burst.
    pub humidity_threshold: f64,
    /// Duration of the humidity-triggered pump burst.
    pub pump_burst: Duration,
    /// How long a pending decision waits for a verdict.
    pub approval_window: Duration,
    /// Ask the decision service every N ticks; `None` disables it.
    pub decision_query_every: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            humidity_threshold: 40.0,
            pump_burst: Duration::from_secs(3),
            approval_window: Duration::from_secs(60),
            decision_query_every: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control channel
// ─────────────────────────────────────────────────────────────────────────────

/// Everything that can be asked of the control loop.
#[derive(Debug)]
pub enum ControlEvent {
    /// A proposed decision arrived on the bus.
    Decision(DecisionMsg),
    /// A verdict for a pending decision arrived on the bus.
    Approval(ApprovalMsg),
    /// A waiter task saw its decision resolved inside the window.
    DecisionResolved { id: String, approved: bool },
    /// A waiter task's approval window elapsed without a verdict.
    DecisionTimedOut { id: String },
    SetDevice {
        name: String,
        on: bool,
        reply: oneshot::Sender<Result<bool, GroveError>>,
    },
    MoveArm {
        angles: Vec<f64>,
        reply: oneshot::Sender<Result<AckReport, GroveError>>,
    },
    EmergencyStop { reply: oneshot::Sender<()> },
    GetCache { reply: oneshot::Sender<Vec<DeviceCommand>> },
    GetHealth { reply: oneshot::Sender<HealthReport> },
    GetStates { reply: oneshot::Sender<BTreeMap<String, bool>> },
    /// Stop the loop after replying.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cloneable handle into the control loop.
///
/// The async methods are the operation surface transport layers call; the
/// `offer_*` methods are the dispatch bridge for bus callbacks and must
/// never block, so they drop (and log) when the loop is absent or behind.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlEvent>,
}

impl ControlHandle {
    /// Create the control channel. The receiver must be passed into
    /// [`Orchestrator::run`]; the handle feeds it from everywhere else.
    pub fn channel() -> (Self, mpsc::Receiver<ControlEvent>) {
        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> ControlEvent,
    ) -> Result<R, GroveError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| GroveError::Channel("control loop stopped".into()))?;
        rx.await
            .map_err(|_| GroveError::Channel("control loop dropped the reply".into()))
    }

    /// Set a named relay. Returns the resulting logical state.
    pub async fn set_device(&self, name: &str, on: bool) -> Result<bool, GroveError> {
        let name = name.to_string();
        self.request(|reply| ControlEvent::SetDevice { name, on, reply })
            .await?
    }

    /// Move the arm through the serial channel.
    pub async fn move_arm(&self, angles: Vec<f64>) -> Result<AckReport, GroveError> {
        self.request(|reply| ControlEvent::MoveArm { angles, reply })
            .await?
    }

    pub async fn emergency_stop(&self) -> Result<(), GroveError> {
        self.request(|reply| ControlEvent::EmergencyStop { reply })
            .await
    }

    pub async fn cache(&self) -> Result<Vec<DeviceCommand>, GroveError> {
        self.request(|reply| ControlEvent::GetCache { reply }).await
    }

    pub async fn health(&self) -> Result<HealthReport, GroveError> {
        self.request(|reply| ControlEvent::GetHealth { reply }).await
    }

    pub async fn states(&self) -> Result<BTreeMap<String, bool>, GroveError> {
        self.request(|reply| ControlEvent::GetStates { reply }).await
    }

    /// Stop the control loop. Resolves once the loop has drained.
    pub async fn shutdown(&self) -> Result<(), GroveError> {
        self.request(|reply| ControlEvent::Shutdown { reply }).await
    }

    /// Non-blocking bridge for the bus task.
    pub fn offer_decision(&self, msg: DecisionMsg) {
        if let Err(e) = self.tx.try_send(ControlEvent::Decision(msg)) {
            debug!(error = %e, "control loop absent or behind; dropping decision");
        }
    }

    /// Non-blocking bridge for the bus task.
    pub fn offer_approval(&self, msg: ApprovalMsg) {
        if let Err(e) = self.tx.try_send(ControlEvent::Approval(msg)) {
            debug!(error = %e, "control loop absent or behind; dropping approval");
        }
    }

    async fn report(&self, event: ControlEvent) {
        // The loop shutting down while waiters are in flight is fine.
        let _ = self.tx.send(event).await;
    }
}

impl InboundHandler for ControlHandle {
    fn on_decision(&self, msg: DecisionMsg) {
        self.offer_decision(msg);
    }

    fn on_approval(&self, msg: ApprovalMsg) {
        self.offer_approval(msg);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// A decision awaiting its verdict.
struct PendingDecision {
    action: DeviceAction,
    received_at: DateTime<Utc>,
    /// Taken by the first verdict; `None` afterwards.
    resolver: Option<oneshot::Sender<bool>>,
}

/// The control core. Built once at startup, then consumed by [`run`].
///
/// [`run`]: Orchestrator::run
pub struct Orchestrator {
    bank: ActuatorBank,
    cache: CommandCache,
    port: Box<dyn CommandPort>,
    sink: Box<dyn StatusSink>,
    sensors: Box<dyn SensorHub>,
    advisor: Option<Box<dyn DecisionService>>,
    camera: Option<Box<dyn FrameSource>>,
    schedule: IrrigationSchedule,
    pending: HashMap<String, PendingDecision>,
    /// When `Some`, the pump is on and due to switch off at this instant.
    /// Serviced by the `run` loop so control events interleave with a run.
    pump_off_at: Option<Instant>,
    emergency: bool,
    cfg: OrchestratorConfig,
    handle: ControlHandle,
    tick_count: u64,
    last_id_ms: u64,
}

impl Orchestrator {
    /// Build the core around an already-created control channel; see
    /// [`ControlHandle::channel`]. The handle is kept so waiter tasks can
    /// report back into the loop.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bank: ActuatorBank,
        cache: CommandCache,
        port: Box<dyn CommandPort>,
        sink: Box<dyn StatusSink>,
        sensors: Box<dyn SensorHub>,
        advisor: Option<Box<dyn DecisionService>>,
        camera: Option<Box<dyn FrameSource>>,
        schedule: IrrigationSchedule,
        cfg: OrchestratorConfig,
        handle: ControlHandle,
    ) -> Self {
        Self {
            bank,
            cache,
            port,
            sink,
            sensors,
            advisor,
            camera,
            schedule,
            pending: HashMap::new(),
            pump_off_at: None,
            emergency: false,
            cfg,
            handle,
            tick_count: 0,
            last_id_ms: 0,
        }
    }

    /// Drive the loop: scheduler ticks interleaved with control events,
    /// until a `Shutdown` event arrives.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ControlEvent>) {
        let mut ticker = tokio::time::interval(self.cfg.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            tick_ms = self.cfg.tick_interval.as_millis() as u64,
            "control loop running"
        );
        loop {
            let pump_off_at = self.pump_off_at.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                // An in-flight pump run is a deadline, not a sleep inside
                // the tick arm: events (an emergency stop above all) keep
                // being serviced while the pump is on.
                _ = tokio::time::sleep_until(pump_off_at), if self.pump_off_at.is_some() => {
                    self.finish_pump_run().await;
                }
                event = rx.recv() => match event {
                    Some(ControlEvent::Shutdown { reply }) => {
                        info!("control loop shutting down");
                        let _ = reply.send(());
                        break;
                    }
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
    }

    // ── Scheduler tick ───────────────────────────────────────────────────

    async fn tick(&mut self) {
        self.tick_count += 1;
        if self.emergency {
            debug!("tick skipped: emergency flag set");
            return;
        }

        let sensors = match self.sensors.read_all().await {
            Ok(map) => map,
            Err(e) => {
                // A collaborator failure never halts the loop; it is
                // embedded in the snapshot instead.
                warn!(error = %e, "sensor read failed");
                let _ = self
                    .sink
                    .log_event(LogCategory::Error, json!({"sensor_read": e.to_string()}))
                    .await;
                let mut map = Map::new();
                map.insert("error".into(), json!(e.to_string()));
                map
            }
        };

        if let Err(e) = self.run_automation(&sensors).await {
            self.safety_fault(e).await;
            return;
        }

        self.publish_snapshot(sensors.clone()).await;
        self.maybe_consult_advisor(&sensors).await;
    }

    /// Humidity rule and irrigation schedule. Any error here is escalated
    /// to a safety fault by the caller.
    async fn run_automation(&mut self, sensors: &Map<String, Value>) -> Result<(), GroveError> {
        if let Some(humidity) = sensors.get("humidity").and_then(Value::as_f64) {
            if humidity < self.cfg.humidity_threshold {
                info!(humidity, threshold = self.cfg.humidity_threshold, "humidity low; pump burst");
                self.start_pump_run(self.cfg.pump_burst)?;
            }
        }

        for duration_secs in self.schedule.due(Local::now()) {
            info!(duration_secs, "irrigation schedule entry due");
            self.start_pump_run(Duration::from_secs(duration_secs))?;
        }
        Ok(())
    }

    /// Switch the pump on for `duration`, re-checking the emergency flag
    /// immediately before acting. Closes the race between an emergency
    /// tripped mid-tick and an automation action landing after it.
    ///
    /// The off-switch is a deadline serviced by [`run`], never an in-place
    /// sleep. Overlapping requests extend the deadline to the furthest one.
    ///
    /// [`run`]: Orchestrator::run
    fn start_pump_run(&mut self, duration: Duration) -> Result<(), GroveError> {
        if self.emergency {
            warn!("pump run skipped: emergency flag set");
            return Ok(());
        }
        self.apply_relay("pump", true)?;
        let off_at = Instant::now() + duration;
        self.pump_off_at = Some(self.pump_off_at.map_or(off_at, |at| at.max(off_at)));
        Ok(())
    }

    /// Deadline arm of [`run`]: the pump run elapsed, switch it off. An
    /// emergency in between already shut the bank down and cleared the
    /// deadline, so this only fires for a live run.
    ///
    /// [`run`]: Orchestrator::run
    async fn finish_pump_run(&mut self) {
        self.pump_off_at = None;
        if let Err(e) = self.apply_relay("pump", false) {
            self.safety_fault(e).await;
        }
    }

    /// Sole relay write path: bank plus cache record.
    fn apply_relay(&mut self, name: &str, on: bool) -> Result<bool, GroveError> {
        let state = self.bank.set(name, on)?;
        self.cache.record(name, json!({ "on": on }));
        Ok(state)
    }

    async fn publish_snapshot(&mut self, sensors: Map<String, Value>) {
        let snapshot = StatusSnapshot {
            sensors,
            actuators: self.bank.states(),
        };
        if let Err(e) = self.sink.publish_status(&snapshot).await {
            warn!(error = %e, "status publish failed");
        }
    }

    async fn maybe_consult_advisor(&mut self, sensors: &Map<String, Value>) {
        let Some(every) = self.cfg.decision_query_every else {
            return;
        };
        if every == 0 || self.tick_count % every != 0 {
            return;
        }
        let Some(advisor) = self.advisor.as_ref() else {
            return;
        };

        // A frame gives the authority visual context; missing camera or a
        // capture failure is not worth more than a log line.
        if let Some(camera) = self.camera.as_mut() {
            match camera.capture().await {
                Ok(frame) => {
                    let _ = self
                        .sink
                        .log_event(LogCategory::Camera, json!({"frame_bytes": frame.len()}))
                        .await;
                }
                Err(e) => warn!(error = %e, "frame capture failed"),
            }
        }

        let query = format!("Current sensor readings: {}", Value::Object(sensors.clone()));
        match advisor.ask(&query).await {
            Ok(reply) => {
                let _ = self
                    .sink
                    .log_event(LogCategory::Llm, json!({"advice": reply}))
                    .await;
            }
            Err(e) => warn!(error = %e, "decision service unreachable"),
        }
    }

    /// Trip the emergency flag and bring the device to rest: relays off,
    /// serial emergency-stop issued. The flag never clears in-process.
    async fn safety_fault(&mut self, cause: GroveError) {
        error!(error = %cause, "safety fault: entering emergency stop");
        let _ = self
            .sink
            .log_event(LogCategory::Error, json!({"safety_fault": cause.to_string()}))
            .await;
        self.enter_emergency().await;
    }

    async fn enter_emergency(&mut self) {
        self.emergency = true;
        // shutdown_all covers an in-flight pump run; drop its deadline.
        self.pump_off_at = None;
        self.bank.shutdown_all();
        self.cache.record("all", json!({ "on": false }));
        let cmd = json!({ "emergency_stop": true });
        self.cache.record("emergency_stop", cmd.clone());
        match self.port.write_command(cmd).await {
            Ok(report) => info!(status = ?report.status, "serial emergency stop issued"),
            Err(e) => error!(error = %e, "serial emergency stop failed"),
        }
    }

    // ── Control events ───────────────────────────────────────────────────

    async fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Decision(msg) => self.handle_decision(msg).await,
            ControlEvent::Approval(msg) => self.handle_approval(msg),
            ControlEvent::DecisionResolved { id, approved } => {
                self.handle_resolution(&id, approved).await
            }
            ControlEvent::DecisionTimedOut { id } => self.handle_timeout(&id).await,
            ControlEvent::SetDevice { name, on, reply } => {
                let result = if self.emergency {
                    Err(GroveError::Unavailable("emergency stop active".into()))
                } else {
                    self.apply_relay(&name, on)
                };
                let _ = reply.send(result);
            }
            ControlEvent::MoveArm { angles, reply } => {
                let result = self.move_arm(angles).await;
                let _ = reply.send(result);
            }
            ControlEvent::EmergencyStop { reply } => {
                info!("emergency stop requested");
                self.enter_emergency().await;
                let _ = reply.send(());
            }
            ControlEvent::GetCache { reply } => {
                let _ = reply.send(self.cache.entries());
            }
            ControlEvent::GetHealth { reply } => {
                let _ = reply.send(HealthReport {
                    serial_open: self.port.is_open(),
                    bus_connected: self.sink.connected(),
                    emergency: self.emergency,
                    cache_size: self.cache.len(),
                });
            }
            ControlEvent::GetStates { reply } => {
                let _ = reply.send(self.bank.states());
            }
            // Consumed by `run`; unreachable here.
            ControlEvent::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn move_arm(&mut self, angles: Vec<f64>) -> Result<AckReport, GroveError> {
        if self.emergency {
            return Err(GroveError::Unavailable("emergency stop active".into()));
        }
        let cmd = json!({ "arm": angles });
        self.cache.record("arm", cmd.clone());
        let report = self.port.write_command(cmd).await?;
        let _ = self
            .sink
            .log_event(
                LogCategory::Robot,
                json!({"status": report.status, "lines": report.lines}),
            )
            .await;
        Ok(report)
    }

    // ── Decision approval ────────────────────────────────────────────────

    /// Generate an id for decisions that arrive without one. Millisecond
    /// timestamp, forced unique within the process.
    fn next_decision_id(&mut self) -> String {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let ms = now_ms.max(self.last_id_ms + 1);
        self.last_id_ms = ms;
        format!("d-{ms}")
    }

    async fn handle_decision(&mut self, msg: DecisionMsg) {
        let action = msg.action();
        let id = match msg.id {
            Some(id) => id,
            None => self.next_decision_id(),
        };
        if self.pending.contains_key(&id) {
            warn!(%id, "duplicate decision id; ignoring");
            return;
        }

        info!(%id, ?action, "decision pending approval");
        let _ = self
            .sink
            .log_event(
                LogCategory::Llm,
                json!({"decision": &id, "action": &action, "status": DecisionStatus::Pending}),
            )
            .await;

        let (resolver, verdict_rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingDecision {
                action,
                received_at: Utc::now(),
                resolver: Some(resolver),
            },
        );

        // The waiter races the verdict against the approval window and
        // reports back through the control channel; the pending table is
        // only ever touched by the control task itself.
        let handle = self.handle.clone();
        let window = self.cfg.approval_window;
        tokio::spawn(async move {
            match tokio::time::timeout(window, verdict_rx).await {
                Ok(Ok(approved)) => {
                    handle.report(ControlEvent::DecisionResolved { id, approved }).await
                }
                // Resolver dropped without a verdict: the entry was evicted.
                Ok(Err(_)) => {}
                Err(_) => handle.report(ControlEvent::DecisionTimedOut { id }).await,
            }
        });
    }

    fn handle_approval(&mut self, msg: ApprovalMsg) {
        let Some(id) = msg.id.as_deref() else {
            warn!("approval without id; dropping");
            return;
        };
        let Some(approved) = msg.verdict() else {
            warn!(%id, "approval without a usable verdict; dropping");
            return;
        };
        match self.pending.get_mut(id) {
            Some(entry) => match entry.resolver.take() {
                Some(resolver) => {
                    // Waiter gone means the window just elapsed; the
                    // timeout event will evict the entry.
                    let _ = resolver.send(approved);
                }
                None => debug!(%id, "decision already resolved; ignoring verdict"),
            },
            None => debug!(%id, "verdict for unknown decision id; ignoring"),
        }
    }

    async fn handle_resolution(&mut self, id: &str, approved: bool) {
        let Some(entry) = self.pending.remove(id) else {
            debug!(%id, "resolution for evicted decision");
            return;
        };
        let status = if approved {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Rejected
        };
        info!(
            %id,
            ?status,
            waited_ms = (Utc::now() - entry.received_at).num_milliseconds(),
            "decision resolved"
        );
        let _ = self
            .sink
            .log_event(LogCategory::Llm, json!({"decision": id, "status": status}))
            .await;
        if approved {
            self.dispatch(entry.action).await;
        }
    }

    async fn handle_timeout(&mut self, id: &str) {
        if self.pending.remove(id).is_none() {
            return;
        }
        // Distinct from rejection: nobody answered.
        warn!(%id, "decision approval window elapsed; evicted");
        let _ = self
            .sink
            .log_event(
                LogCategory::Llm,
                json!({"decision": id, "status": DecisionStatus::TimedOut}),
            )
            .await;
    }

    /// Act on an approved decision. The emergency flag is re-checked here
    /// because it may have been tripped while the decision waited.
    async fn dispatch(&mut self, action: DeviceAction) {
        if self.emergency {
            warn!(?action, "dispatch skipped: emergency flag set");
            return;
        }
        let result = match action {
            DeviceAction::SetLight { on } => self.apply_relay("light", on).map(|_| ()),
            DeviceAction::SetFan { on } => self.apply_relay("fan", on).map(|_| ()),
            DeviceAction::SetPump { on } => self.apply_relay("pump", on).map(|_| ()),
            DeviceAction::RunPump { duration_secs } => {
                self.start_pump_run(Duration::from_secs(duration_secs))
            }
            DeviceAction::EmergencyStop => {
                self.enter_emergency().await;
                Ok(())
            }
            DeviceAction::Unrecognized { raw } => {
                warn!(%raw, "unrecognized approved action; dropping");
                Ok(())
            }
        };
        if let Err(e) = result {
            self.safety_fault(e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use groveos_link::AckStatus;
    use std::sync::{Arc, Mutex};

    struct MockPort {
        written: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl CommandPort for MockPort {
        async fn write_command(&mut self, cmd: Value) -> Result<AckReport, GroveError> {
            self.written.lock().unwrap().push(cmd);
            Ok(AckReport {
                bytes_written: 1,
                lines: vec!["OK".into()],
                status: AckStatus::Ok,
            })
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<(LogCategory, Value)>>>,
        statuses: Arc<Mutex<Vec<StatusSnapshot>>>,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn publish_status(&self, snapshot: &StatusSnapshot) -> Result<(), GroveError> {
            self.statuses.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        async fn log_event(&self, category: LogCategory, data: Value) -> Result<(), GroveError> {
            self.events.lock().unwrap().push((category, data));
            Ok(())
        }

        fn connected(&self) -> bool {
            true
        }
    }

    struct Fixture {
        core: Orchestrator,
        handle: ControlHandle,
        rx: mpsc::Receiver<ControlEvent>,
        written: Arc<Mutex<Vec<Value>>>,
        sink: RecordingSink,
    }

    fn fixture(cfg: OrchestratorConfig) -> Fixture {
        fixture_with(cfg, groveos_hal::ActuatorBank::with_default_pins(), 55.0)
    }

    fn fixture_with(cfg: OrchestratorConfig, bank: ActuatorBank, humidity: f64) -> Fixture {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink::default();
        let sensors = crate::collab::SimSensorHub {
            temperature: 22.0,
            humidity,
        };
        let (handle, rx) = ControlHandle::channel();
        let core = Orchestrator::new(
            bank,
            CommandCache::new(),
            Box::new(MockPort {
                written: Arc::clone(&written),
            }),
            Box::new(sink.clone()),
            Box::new(sensors),
            None,
            None,
            IrrigationSchedule::default(),
            cfg,
            handle.clone(),
        );
        Fixture {
            core,
            handle,
            rx,
            written,
            sink,
        }
    }

    fn decision(id: &str, action: &str, on: bool) -> DecisionMsg {
        serde_json::from_value(json!({ "id": id, "action": action, "on": on })).unwrap()
    }

    fn approval(id: &str, approved: bool) -> ApprovalMsg {
        serde_json::from_value(json!({ "id": id, "approved": approved })).unwrap()
    }

    #[tokio::test]
    async fn approved_decision_dispatches_to_the_bank() {
        let mut f = fixture(OrchestratorConfig::default());
        f.core
            .handle_event(ControlEvent::Decision(decision("d-1", "fan", true)))
            .await;
        f.core
            .handle_event(ControlEvent::Approval(approval("d-1", true)))
            .await;

        // The waiter reports the resolution back through the channel.
        let event = f.rx.recv().await.unwrap();
        match &event {
            ControlEvent::DecisionResolved { id, approved } => {
                assert_eq!(id, "d-1");
                assert!(*approved);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        f.core.handle_event(event).await;

        assert_eq!(f.core.bank.states()["fan"], true);
        assert_eq!(f.core.cache.len(), 1);
        assert!(f.core.pending.is_empty());
    }

    #[tokio::test]
    async fn rejected_decision_does_not_dispatch() {
        let mut f = fixture(OrchestratorConfig::default());
        f.core
            .handle_event(ControlEvent::Decision(decision("d-1", "light", true)))
            .await;
        f.core
            .handle_event(ControlEvent::Approval(approval("d-1", false)))
            .await;
        let event = f.rx.recv().await.unwrap();
        f.core.handle_event(event).await;

        assert_eq!(f.core.bank.states()["light"], false);
        assert!(f.core.pending.is_empty());
    }

    #[tokio::test]
    async fn unanswered_decision_times_out_and_late_approval_is_dropped() {
        let mut f = fixture(OrchestratorConfig {
            approval_window: Duration::from_millis(30),
            ..OrchestratorConfig::default()
        });
        f.core
            .handle_event(ControlEvent::Decision(decision("d-1", "light", true)))
            .await;

        let event = f.rx.recv().await.unwrap();
        assert!(matches!(&event, ControlEvent::DecisionTimedOut { id } if id == "d-1"));
        f.core.handle_event(event).await;
        assert!(f.core.pending.is_empty());

        let timed_out = f
            .sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|(_, data)| data["status"] == json!("timed_out"));
        assert!(timed_out, "timeout must be logged distinctly");

        // A verdict after eviction must not actuate anything.
        f.core
            .handle_event(ControlEvent::Approval(approval("d-1", true)))
            .await;
        assert_eq!(f.core.bank.states()["light"], false);
    }

    #[tokio::test]
    async fn first_verdict_wins_and_the_second_is_a_noop() {
        let mut f = fixture(OrchestratorConfig::default());
        f.core
            .handle_event(ControlEvent::Decision(decision("d-1", "fan", true)))
            .await;
        f.core
            .handle_event(ControlEvent::Approval(approval("d-1", true)))
            .await;
        f.core
            .handle_event(ControlEvent::Approval(approval("d-1", false)))
            .await;

        let event = f.rx.recv().await.unwrap();
        f.core.handle_event(event).await;
        assert_eq!(f.core.bank.states()["fan"], true);

        // Exactly one resolution event; the second verdict produced none.
        assert!(f.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emergency_gates_ticks_operations_and_dispatch() {
        // Humidity well below threshold; a tick would normally pump.
        let mut f = fixture_with(
            OrchestratorConfig {
                pump_burst: Duration::from_millis(1),
                ..OrchestratorConfig::default()
            },
            ActuatorBank::with_default_pins(),
            5.0,
        );

        let (reply, _stop_rx) = oneshot::channel();
        f.core
            .handle_event(ControlEvent::EmergencyStop { reply })
            .await;

        // The serial emergency-stop command went out.
        assert_eq!(
            f.written.lock().unwrap().as_slice(),
            &[json!({"emergency_stop": true})]
        );
        let baseline = f.core.cache.len();

        // Ticks no longer actuate or publish.
        f.core.tick().await;
        assert_eq!(f.core.cache.len(), baseline);
        assert!(f.sink.statuses.lock().unwrap().is_empty());
        assert!(f.core.bank.states().values().all(|on| !on));

        // Operations report unavailable.
        let (reply, rx) = oneshot::channel();
        f.core
            .handle_event(ControlEvent::SetDevice {
                name: "light".into(),
                on: true,
                reply,
            })
            .await;
        assert!(matches!(rx.await.unwrap(), Err(GroveError::Unavailable(_))));

        let (reply, rx) = oneshot::channel();
        f.core
            .handle_event(ControlEvent::MoveArm {
                angles: vec![10.0],
                reply,
            })
            .await;
        assert!(matches!(rx.await.unwrap(), Err(GroveError::Unavailable(_))));

        // Approved decisions are dropped without dispatch.
        f.core
            .handle_event(ControlEvent::Decision(decision("d-1", "light", true)))
            .await;
        f.core
            .handle_event(ControlEvent::Approval(approval("d-1", true)))
            .await;
        let event = f.rx.recv().await.unwrap();
        f.core.handle_event(event).await;
        assert_eq!(f.core.bank.states()["light"], false);

        let (reply, rx) = oneshot::channel();
        f.core.handle_event(ControlEvent::GetHealth { reply }).await;
        assert!(rx.await.unwrap().emergency);
    }

    #[tokio::test]
    async fn low_humidity_tick_runs_a_pump_burst() {
        let mut f = fixture_with(
            OrchestratorConfig {
                humidity_threshold: 40.0,
                pump_burst: Duration::from_millis(1),
                ..OrchestratorConfig::default()
            },
            ActuatorBank::with_default_pins(),
            10.0,
        );
        f.core.tick().await;

        // The tick switches the pump on and arms the off deadline.
        assert_eq!(f.core.bank.states()["pump"], true);
        assert!(f.core.pump_off_at.is_some());

        // Deadline elapsing switches it off; both edges are recorded.
        f.core.finish_pump_run().await;
        let cache = f.core.cache.entries();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[0].name, "pump");
        assert_eq!(cache[0].payload, json!({"on": true}));
        assert_eq!(cache[1].payload, json!({"on": false}));
        assert_eq!(f.core.bank.states()["pump"], false);
        assert!(f.core.pump_off_at.is_none());
        assert!(!f.core.emergency);
        assert_eq!(f.sink.statuses.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn emergency_stop_is_serviced_during_a_pump_run() {
        // A long burst must not make the loop deaf: an emergency stop
        // arriving mid-run is handled at once and ends the run.
        let f = fixture_with(
            OrchestratorConfig {
                tick_interval: Duration::from_millis(10),
                humidity_threshold: 40.0,
                pump_burst: Duration::from_secs(30),
                ..OrchestratorConfig::default()
            },
            ActuatorBank::with_default_pins(),
            10.0,
        );
        let handle = f.handle.clone();
        let task = tokio::spawn(f.core.run(f.rx));

        // Wait for the first tick to start the run.
        let started = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if handle.states().await.unwrap()["pump"] {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(started.is_ok(), "pump run never started");

        tokio::time::timeout(Duration::from_secs(1), handle.emergency_stop())
            .await
            .expect("emergency stop stalled behind the pump run")
            .unwrap();

        let states = handle.states().await.unwrap();
        assert!(states.values().all(|on| !on));
        assert!(handle.health().await.unwrap().emergency);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn automation_error_is_a_safety_fault() {
        // A bank without a pump makes the humidity rule fail.
        let mut f = fixture_with(
            OrchestratorConfig {
                pump_burst: Duration::from_millis(1),
                ..OrchestratorConfig::default()
            },
            ActuatorBank::new([("light", 7), ("fan", 8)]),
            10.0,
        );
        f.core.tick().await;

        assert!(f.core.emergency);
        assert_eq!(
            f.written.lock().unwrap().as_slice(),
            &[json!({"emergency_stop": true})]
        );
        // The fault is logged to the error lane.
        let faulted = f
            .sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|(cat, data)| *cat == LogCategory::Error && data.get("safety_fault").is_some());
        assert!(faulted);
    }

    #[tokio::test]
    async fn handle_drives_the_running_loop() {
        let f = fixture(OrchestratorConfig {
            tick_interval: Duration::from_secs(3600),
            ..OrchestratorConfig::default()
        });
        let handle = f.handle.clone();
        let task = tokio::spawn(f.core.run(f.rx));

        assert!(handle.set_device("light", true).await.unwrap());
        assert_eq!(handle.states().await.unwrap()["light"], true);

        let report = handle.move_arm(vec![0.0, 45.0]).await.unwrap();
        assert_eq!(report.status, AckStatus::Ok);
        assert_eq!(
            f.written.lock().unwrap().last().unwrap(),
            &json!({"arm": [0.0, 45.0]})
        );

        let health = handle.health().await.unwrap();
        assert!(health.serial_open);
        assert!(health.bus_connected);
        assert!(!health.emergency);
        assert_eq!(health.cache_size, 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.set_device("light", false).await,
            Err(GroveError::Channel(_))
        ));
    }

    #[tokio::test]
    async fn advisor_is_consulted_with_a_frame_on_schedule() {
        struct CannedAdvisor;

        #[async_trait]
        impl crate::collab::DecisionService for CannedAdvisor {
            async fn ask(&self, _query: &str) -> Result<String, GroveError> {
                Ok("open the vents".to_string())
            }
        }

        struct CannedCamera;

        #[async_trait]
        impl FrameSource for CannedCamera {
            async fn capture(&mut self) -> Result<Vec<u8>, GroveError> {
                Ok(vec![0u8; 128])
            }
        }

        let mut f = fixture(OrchestratorConfig {
            decision_query_every: Some(1),
            ..OrchestratorConfig::default()
        });
        f.core.advisor = Some(Box::new(CannedAdvisor));
        f.core.camera = Some(Box::new(CannedCamera));
        f.core.tick().await;

        let events = f.sink.events.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|(cat, data)| *cat == LogCategory::Camera
                    && data["frame_bytes"] == json!(128))
        );
        assert!(
            events
                .iter()
                .any(|(cat, data)| *cat == LogCategory::Llm
                    && data["advice"] == json!("open the vents"))
        );
    }

    #[tokio::test]
    async fn decision_without_id_gets_a_generated_one() {
        let mut f = fixture(OrchestratorConfig::default());
        let msg: DecisionMsg =
            serde_json::from_value(json!({ "action": "fan", "on": true })).unwrap();
        f.core.handle_event(ControlEvent::Decision(msg)).await;
        assert_eq!(f.core.pending.len(), 1);
        let id = f.core.pending.keys().next().unwrap();
        assert!(id.starts_with("d-"));
    }
}

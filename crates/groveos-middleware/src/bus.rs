//! MQTT bus: connection management and inbound dispatch.
//!
//! The broker connection runs on its own task. Inbound publishes on the
//! decision and approval lanes are parsed and handed to an
//! [`InboundHandler`] whose methods must not block; the handler is the
//! bridge into the control core's event channel, so a slow consumer must
//! shed load there rather than stall the network task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use groveos_types::{ApprovalMsg, DecisionMsg, GroveError};

use crate::routing::{BusInbound, approvals_topic, decisions_topic, parse_inbound};

/// Pause before re-polling the event loop after a connection error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic prefix all lanes live under, e.g. `greenhouse`.
    pub prefix: String,
    pub keep_alive: Duration,
}

/// Receives parsed inbound messages from the bus task.
///
/// Implementations must return promptly; they run on the network task.
pub trait InboundHandler: Send + Sync {
    fn on_decision(&self, msg: DecisionMsg);
    fn on_approval(&self, msg: ApprovalMsg);
}

/// Handle to the broker connection. Clone it cheaply; all clones share the
/// underlying client and connectivity flag.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    prefix: String,
    connected: Arc<AtomicBool>,
}

impl MqttBus {
    /// Connect to the broker and spawn the event-loop task.
    ///
    /// The task subscribes to the decision and approval lanes, re-issuing
    /// both subscriptions on every reconnect since the broker may have lost
    /// the session, and dispatches parsed publishes into `handler`.
    pub fn connect(cfg: BusConfig, handler: Arc<dyn InboundHandler>) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        options.set_keep_alive(cfg.keep_alive);
        options.set_clean_session(false);

        let (client, mut eventloop) = AsyncClient::new(options, 20);
        let connected = Arc::new(AtomicBool::new(false));

        let bus = Self {
            client: client.clone(),
            prefix: cfg.prefix.clone(),
            connected: Arc::clone(&connected),
        };

        let task = tokio::spawn(async move {
            let decisions = decisions_topic(&cfg.prefix);
            let approvals = approvals_topic(&cfg.prefix);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(host = %cfg.host, port = cfg.port, "mqtt connected");
                        connected.store(true, Ordering::SeqCst);
                        for topic in [&decisions, &approvals] {
                            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                                error!(topic, error = %e, "subscribe failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        match parse_inbound(&cfg.prefix, &p.topic, &p.payload) {
                            Some(BusInbound::Decision(msg)) => handler.on_decision(msg),
                            Some(BusInbound::Approval(msg)) => handler.on_approval(msg),
                            None => {}
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("mqtt disconnected");
                        connected.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::SeqCst);
                        warn!(error = %e, "mqtt event loop error; backing off");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        });

        (bus, task)
    }

    /// `true` while the broker session is up. Publishes are still attempted
    /// when `false`; the client queues them until the session recovers.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Serialize `value` and publish it at QoS 1.
    pub async fn publish_json(&self, topic: &str, value: &Value) -> Result<(), GroveError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| GroveError::Bus(format!("encode for {topic}: {e}")))?;
        debug!(topic, bytes = payload.len(), "publishing");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| GroveError::Bus(format!("publish to {topic}: {e}")))
    }
}

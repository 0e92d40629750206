//! Outbound publishing seam for the control core.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use groveos_types::{GroveError, LogCategory, StatusSnapshot};

use crate::bus::MqttBus;
use crate::routing::{logs_topic, status_topic};

/// Where the control core sends status snapshots and categorised log
/// events. Abstracted so tests can capture publishes in memory.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_status(&self, snapshot: &StatusSnapshot) -> Result<(), GroveError>;
    async fn log_event(&self, category: LogCategory, data: Value) -> Result<(), GroveError>;
    /// Whether the transport behind the sink is currently up.
    fn connected(&self) -> bool;
}

#[async_trait]
impl StatusSink for MqttBus {
    fn connected(&self) -> bool {
        self.is_connected()
    }

    async fn publish_status(&self, snapshot: &StatusSnapshot) -> Result<(), GroveError> {
        let value = serde_json::to_value(snapshot)
            .map_err(|e| GroveError::Bus(format!("encode status: {e}")))?;
        self.publish_json(&status_topic(self.prefix()), &value).await
    }

    async fn log_event(&self, category: LogCategory, data: Value) -> Result<(), GroveError> {
        let envelope = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "category": category.as_str(),
            "data": data,
        });
        self.publish_json(&logs_topic(self.prefix(), category), &envelope)
            .await
    }
}

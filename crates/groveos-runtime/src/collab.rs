//! Collaborator seams.
//!
//! Sensor acquisition, the remote decision authority, and the camera are
//! separate subsystems; the control core only consumes them through these
//! traits. Failures surface as [`GroveError::Collaborator`] and are caught
//! at the call site so a collaborator can never halt the control loop.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use groveos_types::GroveError;

/// Reads every attached sensor into a flat name-to-value mapping.
#[async_trait]
pub trait SensorHub: Send {
    async fn read_all(&mut self) -> Result<Map<String, Value>, GroveError>;
}

/// The remote decision authority's query operation.
///
/// `Sync` is required: the control core queries through a shared reference
/// held across awaits, and its run future must stay spawnable.
#[async_trait]
pub trait DecisionService: Send + Sync {
    /// Ask for advice given a free-form query; returns the reply text.
    async fn ask(&self, query: &str) -> Result<String, GroveError>;
}

/// Still-frame capture from the device camera.
#[async_trait]
pub trait FrameSource: Send {
    async fn capture(&mut self) -> Result<Vec<u8>, GroveError>;
}

/// Deterministic sensor hub for headless runs and tests.
#[derive(Debug, Clone)]
pub struct SimSensorHub {
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for SimSensorHub {
    fn default() -> Self {
        Self {
            temperature: 22.5,
            humidity: 55.0,
        }
    }
}

#[async_trait]
impl SensorHub for SimSensorHub {
    async fn read_all(&mut self) -> Result<Map<String, Value>, GroveError> {
        let mut map = Map::new();
        map.insert("temperature".into(), json!(self.temperature));
        map.insert("humidity".into(), json!(self.humidity));
        Ok(map)
    }
}

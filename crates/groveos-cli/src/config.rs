//! Deployment configuration – `groveos.toml` plus env overrides.
//!
//! Every field has a serde default so a partial (or absent) file still
//! yields a runnable configuration. The env overrides match the names the
//! deployment scripts already export: `MQTT_HOST`, `MQTT_PORT`,
//! `SERIAL_DEV`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use groveos_types::GroveError;

/// Serial channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

/// Broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Control-loop and automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_humidity_threshold")]
    pub humidity_threshold: f64,
    #[serde(default = "default_pump_burst_secs")]
    pub pump_burst_secs: u64,
    #[serde(default = "default_approval_window_secs")]
    pub approval_window_secs: u64,
    /// Ask the coordinator every N ticks; 0 disables it.
    #[serde(default)]
    pub decision_query_every: u64,
}

/// One irrigation schedule entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrigationEntryConfig {
    /// `"HH:MM"`, 24-hour local time.
    pub at: String,
    pub duration_secs: u64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub mqtt: MqttConfig,
    pub control: ControlConfig,
    /// Name → pin mapping for the relay bank.
    #[serde(default = "default_pins")]
    pub pins: Vec<(String, u8)>,
    #[serde(default)]
    pub irrigation: Vec<IrrigationEntryConfig>,
    /// Base URL of the remote decision authority; empty disables it.
    #[serde(default)]
    pub coordinator_url: String,
    /// Run with simulated hardware instead of the physical relays/sensors.
    #[serde(default)]
    pub sim: bool,
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self, GroveError> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .map_err(|e| GroveError::Config(format!("read {}: {e}", path.display())))?;
            toml::from_str(&raw)
                .map_err(|e| GroveError::Config(format!("parse {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        self.override_from(|name| std::env::var(name).ok());
    }

    fn override_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(host) = get("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = get("MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(_) => tracing::warn!(%port, "ignoring unparsable MQTT_PORT"),
            }
        }
        if let Some(device) = get("SERIAL_DEV") {
            self.serial.device = device;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            mqtt: MqttConfig::default(),
            control: ControlConfig::default(),
            pins: default_pins(),
            irrigation: Vec::new(),
            coordinator_url: String::new(),
            sim: false,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud: default_baud(),
            ack_timeout_ms: default_ack_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            prefix: default_prefix(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            humidity_threshold: default_humidity_threshold(),
            pump_burst_secs: default_pump_burst_secs(),
            approval_window_secs: default_approval_window_secs(),
            decision_query_every: 0,
        }
    }
}

fn default_serial_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud() -> u32 {
    115200
}
fn default_ack_timeout_ms() -> u64 {
    750
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_startup_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "groveos-core".to_string()
}
fn default_prefix() -> String {
    "greenhouse".to_string()
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_tick_secs() -> u64 {
    10
}
fn default_humidity_threshold() -> f64 {
    40.0
}
fn default_pump_burst_secs() -> u64 {
    3
}
fn default_approval_window_secs() -> u64 {
    60
}
fn default_pins() -> Vec<(String, u8)> {
    groveos_hal::DEFAULT_PINS
        .iter()
        .map(|(name, pin)| (name.to_string(), *pin))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/groveos.toml")).unwrap();
        assert_eq!(cfg.serial.device, "/dev/ttyUSB0");
        assert_eq!(cfg.mqtt.prefix, "greenhouse");
        assert_eq!(cfg.control.approval_window_secs, 60);
        assert_eq!(cfg.pins.len(), 3);
        assert!(cfg.irrigation.is_empty());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[control]
humidity_threshold = 35.5

[[irrigation]]
at = "07:30"
duration_secs = 10
"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.control.humidity_threshold, 35.5);
        assert_eq!(cfg.control.tick_secs, 10);
        assert_eq!(cfg.irrigation.len(), 1);
        assert_eq!(cfg.irrigation[0].at, "07:30");
        assert_eq!(cfg.mqtt.port, 1883);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = Config::default();
        cfg.override_from(|name| match name {
            "MQTT_HOST" => Some("broker.lan".to_string()),
            "MQTT_PORT" => Some("8883".to_string()),
            "SERIAL_DEV" => Some("/dev/ttyACM1".to_string()),
            _ => None,
        });
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.serial.device, "/dev/ttyACM1");
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let mut cfg = Config::default();
        cfg.override_from(|name| (name == "MQTT_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(cfg.mqtt.port, 1883);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not toml at all [[[").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(GroveError::Config(_))
        ));
    }
}

//! Gateway configuration types.
//!
//! This module contains the configuration loaded from `gateway.toml`:
//! - `GatewayConfig` - Main configuration
//! - `AcquisitionConfig` / `TransportConfig` - Per-worker field-bus settings
//! - `PublisherConfig` / `MqttConfig` - Outbound messaging
//! - `SupervisorConfig` - Worker restart and shutdown policy
//!
//! ```toml
//! [shared]
//! log_level = "info"
//!
//! [[acquisition]]
//! name = "main"
//! driver = "modbus_rtu_server"
//! profile = "main_crane"
//! period_ms = 200
//!
//! [acquisition.transport]
//! port = "/dev/ttyAMA0"
//! unit_id = 1
//! ```

use crate::config::SharedConfig;
use crate::consts::{
    DEFAULT_ACQUISITION_PERIOD_MS, DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS,
    DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_PUBLISH_PERIOD_MS, DEFAULT_PUBLISH_TOPIC,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_STOP_BITS, MAIN_BLOCK_REGISTERS,
    MAX_PERIOD_MS, MODBUS_MAX_READ_REGISTERS, REGISTER_BANK_SIZE, SAFETY_BLOCK_REGISTERS,
};
use crate::hal::consts::{
    DEFAULT_DETECTION_TOPIC, DEFAULT_INCLINATION_TOPIC, DEFAULT_MAX_RESTARTS,
    DEFAULT_MQTT_KEEP_ALIVE_S, DEFAULT_MQTT_PORT, DEFAULT_RESTART_DELAY_MS,
    DRIVER_MODBUS_RTU, DRIVER_MODBUS_RTU_SERVER, DRIVER_UDP, SERIAL_DRIVERS,
};
use crate::hal::driver::{HalError, RegisterRequest};
use crate::registers::WordOrder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

fn default_acquisition_period_ms() -> u64 {
    DEFAULT_ACQUISITION_PERIOD_MS
}

fn default_publish_period_ms() -> u64 {
    DEFAULT_PUBLISH_PERIOD_MS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_join_timeout_ms() -> u64 {
    DEFAULT_JOIN_TIMEOUT_MS
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

fn default_stop_bits() -> u8 {
    DEFAULT_STOP_BITS
}

fn default_unit_id() -> u8 {
    1
}

fn default_topic() -> String {
    DEFAULT_PUBLISH_TOPIC.to_string()
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_keep_alive_s() -> u64 {
    DEFAULT_MQTT_KEEP_ALIVE_S
}

fn default_inclination_topic() -> String {
    DEFAULT_INCLINATION_TOPIC.to_string()
}

fn default_detection_topic() -> String {
    DEFAULT_DETECTION_TOPIC.to_string()
}

fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}

fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}

fn check_period(what: &str, period_ms: u64) -> Result<(), HalError> {
    if period_ms == 0 {
        return Err(HalError::ConfigError(format!(
            "{what}: period_ms must be greater than 0"
        )));
    }
    if period_ms > MAX_PERIOD_MS {
        return Err(HalError::ConfigError(format!(
            "{what}: period_ms {period_ms} exceeds {MAX_PERIOD_MS}"
        )));
    }
    Ok(())
}

/// Main configuration loaded from `gateway.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Logging and service identity.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// One entry per acquisition worker.
    #[serde(default)]
    pub acquisition: Vec<AcquisitionConfig>,

    /// Frame publisher.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Message broker. Absent means log-only publishing.
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,

    /// Restart and shutdown policy.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl GatewayConfig {
    /// Validate the gateway configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` not blank
    /// 2. Every period in `1..=MAX_PERIOD_MS`
    /// 3. Worker names non-empty and unique
    /// 4. Each worker's transport suits its driver and profile
    /// 5. `supervisor.join_timeout_ms` > 0
    ///
    /// Driver names are resolved later against the driver registry.
    pub fn validate(&self) -> Result<(), HalError> {
        self.shared
            .validate()
            .map_err(|e| HalError::ConfigError(e.to_string()))?;

        let mut names = HashSet::new();
        for acq in &self.acquisition {
            acq.validate()?;
            if !names.insert(acq.name.as_str()) {
                return Err(HalError::ConfigError(format!(
                    "Duplicate acquisition worker name: {}",
                    acq.name
                )));
            }
        }

        self.publisher.validate()?;

        if self.supervisor.join_timeout_ms == 0 {
            return Err(HalError::ConfigError(
                "supervisor.join_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.supervisor.restart_delay_ms == 0 {
            return Err(HalError::ConfigError(
                "supervisor.restart_delay_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(mqtt) = &self.mqtt {
            if mqtt.host.trim().is_empty() {
                return Err(HalError::ConfigError("mqtt.host is empty".to_string()));
            }
        }

        Ok(())
    }

    /// Replace every worker's driver, e.g. `simulation` for bench runs.
    pub fn force_driver(&mut self, driver: &str) {
        for acq in &mut self.acquisition {
            acq.driver = driver.to_string();
        }
    }
}

/// `[device]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    /// Fixed serial number. Discovered from the host when absent.
    #[serde(default)]
    pub serial: Option<String>,
}

/// What a worker reads and where the decoded values go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// 40-register controller block.
    #[default]
    MainCrane,
    /// 7-register anti-overturn sensor block.
    SafetySensor,
    /// 25-byte load-cell datagram.
    LoadCells,
}

impl Profile {
    /// Smallest register count the profile decodes; 0 for datagram profiles.
    pub fn min_registers(self) -> u16 {
        match self {
            Self::MainCrane => MAIN_BLOCK_REGISTERS as u16,
            Self::SafetySensor => SAFETY_BLOCK_REGISTERS as u16,
            Self::LoadCells => 0,
        }
    }

    /// True for datagram-based profiles.
    pub fn is_datagram(self) -> bool {
        matches!(self, Self::LoadCells)
    }
}

/// Serial line parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// `[acquisition.transport]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Serial device path.
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    #[serde(default)]
    pub parity: Parity,

    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Local `host:port` for datagram transports.
    #[serde(default)]
    pub bind: Option<String>,

    /// Modbus unit id.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// First holding register.
    #[serde(default)]
    pub address: u16,

    /// Register count. Defaults to the profile's minimum.
    #[serde(default)]
    pub count: Option<u16>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: DEFAULT_STOP_BITS,
            bind: None,
            unit_id: default_unit_id(),
            address: 0,
            count: None,
        }
    }
}

/// `[[acquisition]]` entry: one periodic worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Worker name, unique within the file.
    pub name: String,

    /// Registered driver name.
    pub driver: String,

    #[serde(default)]
    pub profile: Profile,

    #[serde(default = "default_acquisition_period_ms")]
    pub period_ms: u64,

    /// Bound on one transport read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Firmware word order for 32-bit values.
    #[serde(default)]
    pub word_order: WordOrder,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            driver: String::new(),
            profile: Profile::default(),
            period_ms: DEFAULT_ACQUISITION_PERIOD_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            word_order: WordOrder::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Validate one worker entry.
    pub fn validate(&self) -> Result<(), HalError> {
        if self.name.trim().is_empty() {
            return Err(HalError::ConfigError(
                "Acquisition worker has empty name".to_string(),
            ));
        }
        check_period(&self.name, self.period_ms)?;
        if self.read_timeout_ms == 0 {
            return Err(HalError::ConfigError(format!(
                "{}: read_timeout_ms must be greater than 0",
                self.name
            )));
        }

        if SERIAL_DRIVERS.contains(&self.driver.as_str()) && self.transport.port.is_none() {
            return Err(HalError::ConfigError(format!(
                "{}: driver '{}' requires transport.port",
                self.name, self.driver
            )));
        }
        if self.driver == DRIVER_UDP && self.transport.bind.is_none() {
            return Err(HalError::ConfigError(format!(
                "{}: driver 'udp' requires transport.bind",
                self.name
            )));
        }

        let serial = SERIAL_DRIVERS.contains(&self.driver.as_str());
        if (serial && self.profile.is_datagram())
            || (self.driver == DRIVER_UDP && !self.profile.is_datagram())
        {
            return Err(HalError::ConfigError(format!(
                "{}: driver '{}' cannot carry profile {:?}",
                self.name, self.driver, self.profile
            )));
        }

        if self.profile.is_datagram() {
            return Ok(());
        }
        let count = self.register_request().count;
        if count < self.profile.min_registers() {
            return Err(HalError::ConfigError(format!(
                "{}: profile {:?} needs at least {} registers, got {}",
                self.name,
                self.profile,
                self.profile.min_registers(),
                count
            )));
        }
        if self.driver == DRIVER_MODBUS_RTU && count > MODBUS_MAX_READ_REGISTERS {
            return Err(HalError::ConfigError(format!(
                "{}: {} registers exceed the {MODBUS_MAX_READ_REGISTERS}-register read limit",
                self.name, count
            )));
        }
        if self.driver == DRIVER_MODBUS_RTU_SERVER
            && self.transport.address as usize + count as usize > REGISTER_BANK_SIZE
        {
            return Err(HalError::ConfigError(format!(
                "{}: register window {}+{} exceeds the {REGISTER_BANK_SIZE}-register bank",
                self.name, self.transport.address, count
            )));
        }
        Ok(())
    }

    /// Register window read every period.
    pub fn register_request(&self) -> RegisterRequest {
        RegisterRequest {
            unit_id: self.transport.unit_id,
            address: self.transport.address,
            count: self
                .transport
                .count
                .unwrap_or_else(|| self.profile.min_registers()),
        }
    }

    /// Loop period.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Bound on one transport read.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// `[publisher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_publish_period_ms")]
    pub period_ms: u64,

    /// Destination topic for frames.
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PUBLISH_PERIOD_MS,
            topic: default_topic(),
        }
    }
}

impl PublisherConfig {
    /// Validate the publisher section.
    pub fn validate(&self) -> Result<(), HalError> {
        check_period("publisher", self.period_ms)?;
        if self.topic.trim().is_empty() {
            return Err(HalError::ConfigError("publisher.topic is empty".to_string()));
        }
        Ok(())
    }

    /// Loop period.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// `[mqtt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_keep_alive_s")]
    pub keep_alive_s: u64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Subscription carrying inclinometer JSON.
    #[serde(default = "default_inclination_topic")]
    pub inclination_topic: String,

    /// Subscription carrying detection summaries.
    #[serde(default = "default_detection_topic")]
    pub detection_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: DEFAULT_MQTT_PORT,
            keep_alive_s: DEFAULT_MQTT_KEEP_ALIVE_S,
            username: None,
            password: None,
            inclination_topic: default_inclination_topic(),
            detection_topic: default_detection_topic(),
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Per-worker join bound at shutdown.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Restarts allowed per worker after a connect failure.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
        }
    }
}

impl SupervisorConfig {
    /// Join bound per worker.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Pause before a restart.
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

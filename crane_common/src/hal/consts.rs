//! HAL constants: driver identifiers and broker defaults.

/// Canonical HAL service name (used for logging).
pub const HAL_SERVICE_NAME: &str = "crane_hal";

/// Modbus RTU master on a serial line.
pub const DRIVER_MODBUS_RTU: &str = "modbus_rtu";

/// Passive Modbus RTU register server on a serial line.
pub const DRIVER_MODBUS_RTU_SERVER: &str = "modbus_rtu_server";

/// UDP datagram receiver.
pub const DRIVER_UDP: &str = "udp";

/// Synthetic data generator.
pub const DRIVER_SIMULATION: &str = "simulation";

/// Drivers that need a serial `port`.
pub const SERIAL_DRIVERS: [&str; 2] = [DRIVER_MODBUS_RTU, DRIVER_MODBUS_RTU_SERVER];

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT keep-alive in seconds.
pub const DEFAULT_MQTT_KEEP_ALIVE_S: u64 = 120;

/// Default subscription for inclinometer messages.
pub const DEFAULT_INCLINATION_TOPIC: &str = "Event/T-MDS/YJSensing/+/";

/// Default subscription for object-detection summaries.
pub const DEFAULT_DETECTION_TOPIC: &str = "Event/CraneVision/";

/// Default restart budget per worker after a connect failure.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Default pause before restarting a failed worker.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 5_000;

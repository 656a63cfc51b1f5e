//! Device serial discovery.

use std::path::Path;
use tracing::{debug, warn};

/// Serial reported when `/proc/cpuinfo` carries no `Serial` line.
pub const UNKNOWN_SERIAL: &str = "0000000000000000";

/// Serial reported when `/proc/cpuinfo` cannot be read.
pub const ERROR_SERIAL: &str = "ERROR";

const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Extract the upper-cased `Serial` value from cpuinfo text.
pub fn parse_cpu_serial(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("Serial"))
        .and_then(|line| line.split(':').nth(1))
        .map(|value| value.trim().to_uppercase())
}

/// Read the board serial from a cpuinfo-format file.
pub fn cpu_serial_from(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_cpu_serial(&text).unwrap_or_else(|| UNKNOWN_SERIAL.to_string()),
        Err(e) => {
            warn!("cannot read {}: {}", path.display(), e);
            ERROR_SERIAL.to_string()
        }
    }
}

/// Device serial: the configured value if any, else the host's CPU serial.
pub fn device_serial(configured: Option<&str>) -> String {
    if let Some(serial) = configured {
        debug!("using configured device serial");
        return serial.to_string();
    }
    cpu_serial_from(Path::new(CPUINFO_PATH))
}

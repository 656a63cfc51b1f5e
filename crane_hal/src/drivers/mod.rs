//! HAL driver implementations.
//!
//! This module contains all transport drivers:
//!
//! - [`modbus`] - `modbus_rtu` master and `modbus_rtu_server` register bank
//! - [`udp`] - datagram receiver for the load-cell sensor
//! - [`simulation`] - Software simulation driver for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `HalDriver` trait from `crane_common::hal::driver`
//! 3. Register the driver in [`register_all_drivers`]
//! 4. Add its name to `crane_common::hal::consts`

pub mod modbus;
pub mod simulation;
pub mod udp;

use crate::driver_registry::DriverRegistry;
use crane_common::hal::consts::{
    DRIVER_MODBUS_RTU, DRIVER_MODBUS_RTU_SERVER, DRIVER_SIMULATION, DRIVER_UDP,
};

/// Register every built-in driver.
///
/// Called once at startup before any worker is created.
pub fn register_all_drivers(registry: &mut DriverRegistry) {
    registry.register(DRIVER_MODBUS_RTU, modbus::client::create_driver);
    registry.register(DRIVER_MODBUS_RTU_SERVER, modbus::server::create_driver);
    registry.register(DRIVER_UDP, udp::create_driver);
    registry.register(DRIVER_SIMULATION, simulation::create_driver);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_driver_reports_its_registered_name() {
        let mut registry = DriverRegistry::new();
        register_all_drivers(&mut registry);

        let mut names = registry.list_drivers();
        names.sort();
        assert_eq!(names, vec!["modbus_rtu", "modbus_rtu_server", "simulation", "udp"]);

        for name in names {
            let driver = registry.create_driver(name).unwrap();
            assert_eq!(driver.name(), name);
        }
    }
}

//! Simulation driver module.
//!
//! This module provides a software simulation driver for development and testing
//! without field-bus hardware.

mod driver;

pub use driver::SimulationDriver;

use crane_common::hal::driver::HalDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(SimulationDriver::new())
}

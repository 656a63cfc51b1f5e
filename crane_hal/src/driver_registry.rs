//! Driver registry for transport drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving driver
//! factories by the name used in `[[acquisition]].driver`. Built once at
//! startup and handed to `HalCore`; there is no global registry.

use crane_common::hal::driver::{DriverFactory, HalDriver, HalError};
use std::collections::HashMap;

/// Registry of available transport drivers.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in driver.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no driver with the given name is registered.
    pub fn get_factory(&self, name: &str) -> Result<DriverFactory, HalError> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))
    }

    /// Create a driver instance by name.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn HalDriver>, HalError> {
        Ok(self.get_factory(name)?())
    }

    /// List all registered driver names.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crane_common::hal::config::AcquisitionConfig;
    use crane_common::hal::driver::{RawSample, RegisterRequest};
    use std::time::Duration;

    struct TestDriver;

    impl HalDriver for TestDriver {
        fn name(&self) -> &'static str {
            "test"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn init(&mut self, _config: &AcquisitionConfig) -> Result<(), HalError> {
            Ok(())
        }

        fn fetch(
            &mut self,
            request: &RegisterRequest,
            _timeout: Duration,
        ) -> Result<RawSample, HalError> {
            Ok(RawSample::Registers(vec![0; request.count as usize]))
        }

        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    fn create_test_driver() -> Box<dyn HalDriver> {
        Box::new(TestDriver)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("test_driver", create_test_driver);

        let driver = reg.create_driver("test_driver").expect("should create");
        assert_eq!(driver.name(), "test");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        assert!(matches!(
            reg.create_driver("nonexistent"),
            Err(HalError::DriverNotFound(_))
        ));
        assert!(matches!(
            reg.get_factory("nonexistent"),
            Err(HalError::DriverNotFound(_))
        ));
    }

    #[test]
    fn registry_list_drivers() {
        let mut reg = DriverRegistry::new();
        reg.register("alpha", create_test_driver);
        reg.register("beta", create_test_driver);

        let mut names = reg.list_drivers();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn builtin_registry_has_simulation() {
        let reg = DriverRegistry::with_builtin_drivers();
        assert!(reg.get_factory("simulation").is_ok());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_test_driver);
        reg.register("dup", create_test_driver);
    }
}

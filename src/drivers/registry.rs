use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::drivers::{SqliteDriver, TokioPostgresDriver};
use crate::error::{BridgeError, Result};
use crate::traits::DatabaseDriver;

/// Maps driver identifiers to driver implementations.
///
/// `connect` takes an identifier rather than a driver object so host scripts
/// can name the database they want with a plain string.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in PostgreSQL and SQLite drivers under their
    /// common names, including the JDBC class names scripts tend to pass.
    pub fn with_defaults() -> Self {
        let postgres: Arc<dyn DatabaseDriver> = Arc::new(TokioPostgresDriver::new());
        let sqlite: Arc<dyn DatabaseDriver> = Arc::new(SqliteDriver::new());

        let mut registry = Self::new();
        for id in ["postgres", "postgresql", "org.postgresql.Driver"] {
            registry.register(id, Arc::clone(&postgres));
        }
        for id in ["sqlite", "sqlite3", "org.sqlite.JDBC"] {
            registry.register(id, Arc::clone(&sqlite));
        }
        registry
    }

    /// Register `driver` under `id`, replacing any previous registration.
    pub fn register(&mut self, id: impl Into<String>, driver: Arc<dyn DatabaseDriver>) {
        self.drivers.insert(id.into(), driver);
    }

    pub fn with_driver(mut self, id: impl Into<String>, driver: Arc<dyn DatabaseDriver>) -> Self {
        self.register(id, driver);
        self
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn DatabaseDriver>> {
        self.drivers
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::DriverLoad(format!("no driver registered for '{}'", id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.drivers.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::InMemoryTestDriver;

    #[test]
    fn test_defaults_cover_common_names() {
        let registry = DriverRegistry::with_defaults();
        for id in ["postgres", "org.postgresql.Driver", "sqlite", "org.sqlite.JDBC"] {
            assert!(registry.contains(id), "missing {}", id);
        }
    }

    #[test]
    fn test_unknown_identifier_is_a_driver_load_error() {
        let registry = DriverRegistry::new();
        match registry.resolve("com.example.Missing") {
            Err(BridgeError::DriverLoad(message)) => {
                assert_eq!(message, "no driver registered for 'com.example.Missing'")
            }
            other => panic!("Expected DriverLoad error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_register_replaces() {
        let registry = DriverRegistry::with_defaults()
            .with_driver("sqlite", Arc::new(InMemoryTestDriver::new()));
        assert!(registry.resolve("sqlite").is_ok());
        assert_eq!(registry.identifiers().len(), 6);
    }
}

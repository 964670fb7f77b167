use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId};
use crate::error::{BridgeError, Result};
use crate::traits::DriverStatement;

/// Default number of cached statements before the cache is flushed.
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 20;

/// Holds at most one reusable ad-hoc statement per connection.
///
/// When a new statement would be inserted into a full cache, every entry is
/// dropped first. This is a flush, not LRU eviction. Dropped statements are
/// never closed here; they stay live on the driver until their connection
/// closes.
pub struct StatementCache {
    entries: HashMap<ConnectionId, Arc<dyn DriverStatement>>,
    capacity: usize,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Return the connection's cached statement, creating one on first use.
    pub async fn get_or_create(
        &mut self,
        connection: &Connection,
    ) -> Result<Arc<dyn DriverStatement>> {
        if let Some(stmt) = self.entries.get(&connection.id()) {
            return Ok(Arc::clone(stmt));
        }

        let stmt = connection
            .driver_connection()
            .create_statement()
            .await
            .map_err(|e| BridgeError::StatementCreation(e.into_message()))?;
        tracing::debug!(connection = %connection.id(), "created statement");

        if self.entries.len() >= self.capacity {
            tracing::debug!(
                evicted = self.entries.len(),
                capacity = self.capacity,
                "statement cache full, flushing"
            );
            self.entries = HashMap::with_capacity(self.capacity);
        }

        self.entries.insert(connection.id(), Arc::clone(&stmt));
        Ok(stmt)
    }

    /// Forget the statement of one connection, if cached.
    pub fn evict(&mut self, connection: ConnectionId) -> bool {
        self.entries.remove(&connection).is_some()
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.entries.contains_key(&connection)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATEMENT_CACHE_CAPACITY)
    }
}

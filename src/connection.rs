use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::{DriverConnection, DriverCursor, DriverPreparedStatement};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection, used as the statement cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Caller-owned handle to an open database session.
///
/// Clones refer to the same session. Closing is always explicit.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    driver: String,
    inner: Arc<dyn DriverConnection>,
}

impl Connection {
    /// Wrap a driver connection, assigning it a fresh id.
    pub fn new(driver: impl Into<String>, inner: Box<dyn DriverConnection>) -> Self {
        Self {
            id: ConnectionId::next(),
            driver: driver.into(),
            inner: Arc::from(inner),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The driver identifier the connection was opened with.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub(crate) fn driver_connection(&self) -> &dyn DriverConnection {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

/// Forward-only, single-pass cursor returned by a query.
/// Owned by the caller, who exhausts or drops it.
pub struct ResultCursor {
    connection: ConnectionId,
    inner: Box<dyn DriverCursor>,
}

impl ResultCursor {
    pub(crate) fn new(connection: ConnectionId, inner: Box<dyn DriverCursor>) -> Self {
        Self { connection, inner }
    }

    /// The connection whose statement produced this cursor.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    pub(crate) fn driver_cursor(&mut self) -> &mut dyn DriverCursor {
        self.inner.as_mut()
    }
}

impl fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// A parameterized statement bound to one connection.
pub struct PreparedStatementHandle {
    connection: ConnectionId,
    sql: String,
    inner: Box<dyn DriverPreparedStatement>,
}

impl PreparedStatementHandle {
    pub(crate) fn new(
        connection: ConnectionId,
        sql: impl Into<String>,
        inner: Box<dyn DriverPreparedStatement>,
    ) -> Self {
        Self {
            connection,
            sql: sql.into(),
            inner,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    pub(crate) fn driver_statement(&mut self) -> &mut dyn DriverPreparedStatement {
        self.inner.as_mut()
    }
}

impl fmt::Debug for PreparedStatementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatementHandle")
            .field("connection", &self.connection)
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

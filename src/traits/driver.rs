use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DriverResult;
use crate::types::SqlValue;

/// Trait for database driver implementations.
/// A driver is responsible for:
/// - Opening connections from a URL and credentials
/// - Creating ad-hoc and prepared statements on those connections
/// - Rendering result values as text
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Open a new connection. Empty credentials mean "use whatever the URL says".
    async fn connect(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> DriverResult<Box<dyn DriverConnection>>;
}

/// An open database session.
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Create a statement for ad-hoc SQL. The statement is reusable across
    /// any number of executions on this connection.
    async fn create_statement(&self) -> DriverResult<Arc<dyn DriverStatement>>;

    /// Compile `sql` with positional placeholders.
    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn DriverPreparedStatement>>;

    /// Close the session. Statements and cursors created from it fail afterwards.
    async fn close(&self) -> DriverResult<()>;
}

/// A reusable handle for ad-hoc SQL on one connection.
#[async_trait]
pub trait DriverStatement: Send + Sync {
    async fn execute_query(&self, sql: &str) -> DriverResult<Box<dyn DriverCursor>>;

    /// Returns the number of rows affected.
    async fn execute_update(&self, sql: &str) -> DriverResult<u64>;
}

/// Forward-only cursor over the rows of a query.
///
/// Column positions are zero-based. Metadata is available before the first
/// call to `next`; values only once the cursor is positioned on a row.
#[async_trait]
pub trait DriverCursor: Send {
    /// Advance to the next row. Returns `false` once the rows are exhausted.
    async fn next(&mut self) -> DriverResult<bool>;

    fn column_count(&self) -> DriverResult<usize>;

    fn column_label(&self, index: usize) -> DriverResult<String>;

    /// Text rendering of the value in the current row; `None` for NULL.
    fn get_string(&self, index: usize) -> DriverResult<Option<String>>;
}

/// A compiled statement with positional parameters.
#[async_trait]
pub trait DriverPreparedStatement: Send {
    fn parameter_count(&self) -> usize;

    /// Bind a value to the 1-based parameter `index`.
    async fn set(&mut self, index: usize, value: SqlValue) -> DriverResult<()>;

    /// Run the statement with the currently bound values.
    /// Returns the number of rows affected.
    async fn execute(&mut self) -> DriverResult<u64>;
}

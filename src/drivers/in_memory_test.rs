use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::drivers::BufferedCursor;
use crate::error::{DriverError, DriverResult};
use crate::traits::{
    DatabaseDriver, DriverConnection, DriverCursor, DriverPreparedStatement, DriverStatement,
};
use crate::types::{RawQueryResult, SqlValue};

/// How a recorded statement reached the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Update,
    Prepared,
}

/// A recorded statement execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

struct ScriptedResult {
    result: RawQueryResult,
    fail_at_row: Option<(usize, String)>,
}

#[derive(Default)]
struct Failures {
    connect: Option<String>,
    create_statement: Option<String>,
    next_query: VecDeque<String>,
    next_update: VecDeque<String>,
    next_prepare: VecDeque<String>,
    next_execute: VecDeque<String>,
}

struct Shared {
    responses: Mutex<VecDeque<ScriptedResult>>,
    update_counts: Mutex<VecDeque<u64>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    failures: Mutex<Failures>,
    default_response: Mutex<RawQueryResult>,
    connections_opened: AtomicUsize,
    statements_created: AtomicUsize,
}

impl Shared {
    fn record(&self, kind: StatementKind, sql: &str, params: Vec<SqlValue>) {
        self.recorded_queries.lock().unwrap().push(RecordedQuery {
            kind,
            sql: sql.to_string(),
            params,
        });
    }
}

/// An in-memory database driver for testing.
///
/// Query responses are returned in FIFO order, update counts likewise, and
/// every execution is recorded. Failures can be injected at each step.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use dbbridge::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(&["1", "Alice"])
///             .build(),
///     ),
/// );
/// assert_eq!(driver.statements_created(), 0);
/// ```
pub struct InMemoryTestDriver {
    shared: Arc<Shared>,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                responses: Mutex::new(VecDeque::new()),
                update_counts: Mutex::new(VecDeque::new()),
                recorded_queries: Mutex::new(Vec::new()),
                failures: Mutex::new(Failures::default()),
                default_response: Mutex::new(RawQueryResult::empty()),
                connections_opened: AtomicUsize::new(0),
                statements_created: AtomicUsize::new(0),
            }),
        }
    }

    /// Add a response to be returned by the next query.
    pub fn with_response(self, response: RawQueryResult) -> Self {
        self.push_response(response);
        self
    }

    /// Add multiple responses to be returned by subsequent queries.
    pub fn with_responses(self, responses: impl IntoIterator<Item = RawQueryResult>) -> Self {
        for response in responses {
            self.push_response(response);
        }
        self
    }

    /// Add a response whose cursor fails when advancing onto zero-based `row`.
    pub fn with_failing_response(
        self,
        response: RawQueryResult,
        row: usize,
        message: impl Into<String>,
    ) -> Self {
        self.shared
            .responses
            .lock()
            .unwrap()
            .push_back(ScriptedResult {
                result: response,
                fail_at_row: Some((row, message.into())),
            });
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(self, response: RawQueryResult) -> Self {
        *self.shared.default_response.lock().unwrap() = response;
        self
    }

    /// Queue the affected-row count reported by the next update or prepared
    /// execution. Unqueued executions report 0.
    pub fn with_update_count(self, count: u64) -> Self {
        self.shared.update_counts.lock().unwrap().push_back(count);
        self
    }

    pub fn push_response(&self, response: RawQueryResult) {
        self.shared
            .responses
            .lock()
            .unwrap()
            .push_back(ScriptedResult {
                result: response,
                fail_at_row: None,
            });
    }

    pub fn push_update_count(&self, count: u64) {
        self.shared.update_counts.lock().unwrap().push_back(count);
    }

    /// Every subsequent connect fails with `message`.
    pub fn fail_connect(&self, message: impl Into<String>) {
        self.shared.failures.lock().unwrap().connect = Some(message.into());
    }

    /// Every subsequent statement creation fails with `message`.
    pub fn fail_statement_creation(&self, message: impl Into<String>) {
        self.shared.failures.lock().unwrap().create_statement = Some(message.into());
    }

    pub fn fail_next_query(&self, message: impl Into<String>) {
        self.shared
            .failures
            .lock()
            .unwrap()
            .next_query
            .push_back(message.into());
    }

    pub fn fail_next_update(&self, message: impl Into<String>) {
        self.shared
            .failures
            .lock()
            .unwrap()
            .next_update
            .push_back(message.into());
    }

    pub fn fail_next_prepare(&self, message: impl Into<String>) {
        self.shared
            .failures
            .lock()
            .unwrap()
            .next_prepare
            .push_back(message.into());
    }

    pub fn fail_next_execute(&self, message: impl Into<String>) {
        self.shared
            .failures
            .lock()
            .unwrap()
            .next_execute
            .push_back(message.into());
    }

    /// Number of connections opened through this driver.
    pub fn connections_opened(&self) -> usize {
        self.shared.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of ad-hoc statements created across all connections.
    pub fn statements_created(&self) -> usize {
        self.shared.statements_created.load(Ordering::SeqCst)
    }

    /// Get all recorded executions.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.shared.recorded_queries.lock().unwrap().clone()
    }

    /// Get the last recorded execution, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.shared.recorded_queries.lock().unwrap().last().cloned()
    }

    /// Clear all recorded executions.
    pub fn clear_recorded_queries(&self) {
        self.shared.recorded_queries.lock().unwrap().clear();
    }

    /// Assert that the last execution matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n executions were recorded.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.shared.recorded_queries.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryTestDriver {
    async fn connect(
        &self,
        _url: &str,
        _username: &str,
        _password: &str,
    ) -> DriverResult<Box<dyn DriverConnection>> {
        if let Some(message) = self.shared.failures.lock().unwrap().connect.clone() {
            return Err(DriverError::new(message));
        }
        self.shared.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryConnection {
            shared: Arc::clone(&self.shared),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct InMemoryConnection {
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
}

fn ensure_open(closed: &AtomicBool) -> DriverResult<()> {
    if closed.load(Ordering::SeqCst) {
        Err(DriverError::new("connection is closed"))
    } else {
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for InMemoryConnection {
    async fn create_statement(&self) -> DriverResult<Arc<dyn DriverStatement>> {
        ensure_open(&self.closed)?;
        if let Some(message) = self.shared.failures.lock().unwrap().create_statement.clone() {
            return Err(DriverError::new(message));
        }
        self.shared.statements_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryStatement {
            shared: Arc::clone(&self.shared),
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn DriverPreparedStatement>> {
        ensure_open(&self.closed)?;
        if let Some(message) = self.shared.failures.lock().unwrap().next_prepare.pop_front() {
            return Err(DriverError::new(message));
        }
        // Placeholders are counted naively; test SQL never quotes a '?'.
        let count = sql.matches('?').count();
        Ok(Box::new(InMemoryPreparedStatement {
            shared: Arc::clone(&self.shared),
            closed: Arc::clone(&self.closed),
            sql: sql.to_string(),
            params: vec![None; count],
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::new("connection is already closed"));
        }
        Ok(())
    }
}

struct InMemoryStatement {
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DriverStatement for InMemoryStatement {
    async fn execute_query(&self, sql: &str) -> DriverResult<Box<dyn DriverCursor>> {
        ensure_open(&self.closed)?;
        self.shared.record(StatementKind::Query, sql, Vec::new());
        if let Some(message) = self.shared.failures.lock().unwrap().next_query.pop_front() {
            return Err(DriverError::new(message));
        }

        // Return next queued response or default
        let scripted = self
            .shared
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedResult {
                result: self.shared.default_response.lock().unwrap().clone(),
                fail_at_row: None,
            });

        let cursor = BufferedCursor::new(scripted.result);
        Ok(match scripted.fail_at_row {
            Some((row, message)) => Box::new(cursor.failing_at(row, message)),
            None => Box::new(cursor),
        })
    }

    async fn execute_update(&self, sql: &str) -> DriverResult<u64> {
        ensure_open(&self.closed)?;
        self.shared.record(StatementKind::Update, sql, Vec::new());
        if let Some(message) = self.shared.failures.lock().unwrap().next_update.pop_front() {
            return Err(DriverError::new(message));
        }
        Ok(self
            .shared
            .update_counts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(0))
    }
}

struct InMemoryPreparedStatement {
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
    sql: String,
    params: Vec<Option<SqlValue>>,
}

#[async_trait]
impl DriverPreparedStatement for InMemoryPreparedStatement {
    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    async fn set(&mut self, index: usize, value: SqlValue) -> DriverResult<()> {
        ensure_open(&self.closed)?;
        let count = self.params.len();
        match index.checked_sub(1).and_then(|i| self.params.get_mut(i)) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(DriverError::new(format!(
                "parameter index {} out of range (statement has {} parameters)",
                index, count
            ))),
        }
    }

    async fn execute(&mut self) -> DriverResult<u64> {
        ensure_open(&self.closed)?;
        let mut params = Vec::with_capacity(self.params.len());
        for (i, value) in self.params.iter().enumerate() {
            match value {
                Some(v) => params.push(v.clone()),
                None => {
                    return Err(DriverError::new(format!(
                        "no value specified for parameter {}",
                        i + 1
                    )))
                }
            }
        }
        self.shared.record(StatementKind::Prepared, &self.sql, params);
        if let Some(message) = self.shared.failures.lock().unwrap().next_execute.pop_front() {
            return Err(DriverError::new(message));
        }
        Ok(self
            .shared
            .update_counts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(0))
    }
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set the column labels for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of non-NULL values.
    pub fn row(mut self, values: &[&str]) -> Self {
        self.rows
            .push(values.iter().map(|s| Some(s.to_string())).collect());
        self
    }

    /// Add a row where `None` stands for NULL.
    pub fn row_with_nulls(mut self, values: &[Option<&str>]) -> Self {
        self.rows
            .push(values.iter().map(|v| v.map(str::to_string)).collect());
        self
    }

    /// Build the RawQueryResult.
    pub fn build(self) -> RawQueryResult {
        RawQueryResult::new(self.columns, self.rows)
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_statement_records_and_replays() {
        let driver = InMemoryTestDriver::new()
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["id"])
                    .row(&["1"])
                    .build(),
            )
            .with_update_count(3);
        let conn = driver.connect("mem://", "", "").await.unwrap();
        let stmt = conn.create_statement().await.unwrap();

        let mut cursor = stmt.execute_query("SELECT id FROM t").await.unwrap();
        assert!(cursor.next().await.unwrap());
        assert_eq!(cursor.get_string(0).unwrap(), Some("1".to_string()));
        assert_eq!(stmt.execute_update("DELETE FROM t").await.unwrap(), 3);
        assert_eq!(stmt.execute_update("DELETE FROM t").await.unwrap(), 0);

        let kinds: Vec<StatementKind> = driver.recorded_queries().iter().map(|q| q.kind).collect();
        assert_eq!(
            kinds,
            vec![StatementKind::Query, StatementKind::Update, StatementKind::Update]
        );
        assert_eq!(driver.statements_created(), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_work() {
        let driver = InMemoryTestDriver::new();
        let conn = driver.connect("mem://", "", "").await.unwrap();
        let stmt = conn.create_statement().await.unwrap();
        conn.close().await.unwrap();

        let err = stmt.execute_update("DELETE FROM t").await.unwrap_err();
        assert_eq!(err.to_string(), "connection is closed");
        assert!(conn.create_statement().await.is_err());
        assert!(conn.close().await.is_err());
    }

    #[tokio::test]
    async fn test_prepared_requires_every_parameter() {
        let driver = InMemoryTestDriver::new();
        let conn = driver.connect("mem://", "", "").await.unwrap();
        let mut stmt = conn
            .prepare("INSERT INTO t (a, b) VALUES (?, ?)")
            .await
            .unwrap();
        assert_eq!(stmt.parameter_count(), 2);

        stmt.set(1, SqlValue::from(1)).await.unwrap();
        assert!(stmt.set(0, SqlValue::Null).await.is_err());
        assert!(stmt.set(3, SqlValue::Null).await.is_err());
        let err = stmt.execute().await.unwrap_err();
        assert_eq!(err.to_string(), "no value specified for parameter 2");
        driver.assert_query_count(0);
    }
}

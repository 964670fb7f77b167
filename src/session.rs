use tokio::runtime::{Builder, Runtime};
use tokio::sync::Mutex;

use crate::cache::StatementCache;
use crate::config::BridgeConfig;
use crate::connection::{Connection, PreparedStatementHandle, ResultCursor};
use crate::counter::FetchedRowCounter;
use crate::drivers::DriverRegistry;
use crate::error::{BridgeError, Result};
use crate::types::{NamedRow, PositionalRow, SqlValue};
use crate::{executor, materializer, prepared};

struct SessionState {
    cache: StatementCache,
    counter: FetchedRowCounter,
    last_error: Option<String>,
}

impl SessionState {
    /// Flag a failed operation on the error channel and pass the result on.
    fn record<T>(&mut self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            tracing::warn!(operation, error = %err, "database operation failed");
            self.last_error = Some(err.to_string());
        }
        result
    }
}

/// Main entry point for dbbridge.
///
/// A session owns the statement cache, the fetched-row counter and the error
/// channel, so separate sessions never observe each other. Every operation
/// blocks the calling thread until the driver answers; the session drives the
/// async drivers on its own runtime.
///
/// Operations of one session are serialized. Calling them from inside an
/// async task panics, as does dropping the session there.
///
/// # Example
/// ```
/// use dbbridge::Session;
///
/// let session = Session::new().unwrap();
/// let conn = session.connect("sqlite", "sqlite::memory:", "", "").unwrap();
/// session.update(&conn, "CREATE TABLE t (id INTEGER)").unwrap();
/// assert_eq!(session.update(&conn, "INSERT INTO t VALUES (1), (2)").unwrap(), 2);
///
/// let mut cursor = session.query(&conn, "SELECT id FROM t ORDER BY id").unwrap();
/// let rows = session.fetch_buffered(&mut cursor).unwrap();
/// assert_eq!(rows[1].get("id").unwrap(), Some("2"));
/// assert_eq!(session.fetched_rows(), 2);
/// ```
pub struct Session {
    runtime: Runtime,
    registry: DriverRegistry,
    config: BridgeConfig,
    state: Mutex<SessionState>,
}

impl Session {
    /// A session with the default configuration and built-in drivers.
    pub fn new() -> Result<Self> {
        Self::with_config(BridgeConfig::default(), DriverRegistry::with_defaults())
    }

    /// A session with the default configuration and a custom set of drivers.
    /// Useful for testing or embedding alternative drivers.
    pub fn with_registry(registry: DriverRegistry) -> Result<Self> {
        Self::with_config(BridgeConfig::default(), registry)
    }

    pub fn with_config(config: BridgeConfig, registry: DriverRegistry) -> Result<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("dbbridge-worker")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to start runtime: {}", e)))?;

        Ok(Self {
            runtime,
            registry,
            state: Mutex::new(SessionState {
                cache: StatementCache::new(config.statement_cache_capacity),
                counter: FetchedRowCounter::new(),
                last_error: None,
            }),
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Open a connection with the driver registered as `driver_id`.
    pub fn connect(
        &self,
        driver_id: &str,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Connection> {
        self.runtime.block_on(async {
            let mut state = self.state.lock().await;
            let result: Result<Connection> = async {
                let driver = self.registry.resolve(driver_id)?;
                let inner = driver
                    .connect(url, username, password)
                    .await
                    .map_err(|e| BridgeError::Connection(e.into_message()))?;
                Ok::<_, BridgeError>(Connection::new(driver_id, inner))
            }
            .await;

            if let Ok(conn) = &result {
                tracing::info!(connection = %conn.id(), driver = driver_id, "connected");
            }
            state.record("connect", result)
        })
    }

    /// Close a connection and forget its cached statement.
    pub fn close(&self, connection: &Connection) -> Result<()> {
        self.runtime.block_on(async {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.cache.evict(connection.id());
            let result = connection
                .driver_connection()
                .close()
                .await
                .map_err(|e| BridgeError::Connection(e.into_message()));
            if result.is_ok() {
                tracing::info!(
                    connection = %connection.id(),
                    driver = connection.driver(),
                    "closed"
                );
            }
            state.record("close", result)
        })
    }

    /// Run `sql` as a query. The cursor belongs to the caller.
    pub fn query(&self, connection: &Connection, sql: &str) -> Result<ResultCursor> {
        self.runtime.block_on(async {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let result = executor::run_query(&mut state.cache, connection, sql).await;
            state.record("query", result)
        })
    }

    /// Run `sql` as an update and return the affected-row count, which also
    /// becomes the fetched-row count.
    pub fn update(&self, connection: &Connection, sql: &str) -> Result<u64> {
        self.runtime.block_on(async {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let result =
                executor::run_update(&mut state.cache, &mut state.counter, connection, sql).await;
            state.record("update", result)
        })
    }

    /// Fetch the next row keyed by column label; `None` at end of data.
    ///
    /// Resets the fetched-row count without counting the row.
    pub fn fetch(&self, cursor: &mut ResultCursor) -> Result<Option<NamedRow>> {
        self.runtime.block_on(async {
            let mut state = self.state.lock().await;
            state.counter.reset();
            let result = materializer::next_row_as_map(cursor).await;
            state.record("fetch", result)
        })
    }

    /// Fetch the next row as values in column order; `None` at end of data.
    ///
    /// Resets the fetched-row count without counting the row.
    pub fn fetch_array(&self, cursor: &mut ResultCursor) -> Result<Option<PositionalRow>> {
        self.runtime.block_on(async {
            let mut state = self.state.lock().await;
            state.counter.reset();
            let result = materializer::next_row_as_sequence(cursor).await;
            state.record("fetch_array", result)
        })
    }

    /// Like [`Session::fetch`], also storing the outcome in `out`.
    /// `out` is left alone if the fetch fails.
    pub fn assign(
        &self,
        cursor: &mut ResultCursor,
        out: &mut Option<NamedRow>,
    ) -> Result<Option<NamedRow>> {
        let row = self.fetch(cursor)?;
        out.clone_from(&row);
        Ok(row)
    }

    /// Like [`Session::fetch_array`], also storing the outcome in `out`.
    pub fn assign_array(
        &self,
        cursor: &mut ResultCursor,
        out: &mut Option<PositionalRow>,
    ) -> Result<Option<PositionalRow>> {
        let row = self.fetch_array(cursor)?;
        out.clone_from(&row);
        Ok(row)
    }

    /// Drain the cursor into label-keyed rows and record how many there were.
    pub fn fetch_buffered(&self, cursor: &mut ResultCursor) -> Result<Vec<NamedRow>> {
        self.runtime.block_on(async {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let result = materializer::fetch_all_as_maps(cursor, &mut state.counter).await;
            state.record("fetch_buffered", result)
        })
    }

    /// Drain the cursor into positional rows and record how many there were.
    pub fn fetch_buffered_array(&self, cursor: &mut ResultCursor) -> Result<Vec<PositionalRow>> {
        self.runtime.block_on(async {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let result = materializer::fetch_all_as_sequences(cursor, &mut state.counter).await;
            state.record("fetch_buffered_array", result)
        })
    }

    /// Rows counted by the last buffered fetch or update.
    pub fn fetched_rows(&self) -> u64 {
        self.runtime.block_on(async { self.state.lock().await.counter.get() })
    }

    /// Compile `sql` and bind `params` to positions 1..=n.
    pub fn prepare(
        &self,
        connection: &Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<PreparedStatementHandle> {
        self.runtime.block_on(async {
            let mut state = self.state.lock().await;
            let result = prepared::prepare(connection, sql, params).await;
            state.record("prepare", result)
        })
    }

    /// Set one 1-based parameter. Returns `false` and flags the error if the
    /// driver rejects the value or the index.
    pub fn bind(
        &self,
        handle: &mut PreparedStatementHandle,
        index: usize,
        value: impl Into<SqlValue>,
    ) -> bool {
        let value = value.into();
        self.runtime.block_on(async {
            let mut state = self.state.lock().await;
            let result = prepared::bind(handle, index, value).await;
            state.record("bind", result).is_ok()
        })
    }

    /// Execute a prepared statement. Returns `false` and flags the error if
    /// the driver fails.
    pub fn execute(&self, handle: &mut PreparedStatementHandle) -> bool {
        self.runtime.block_on(async {
            let mut state = self.state.lock().await;
            let result = prepared::execute(handle).await;
            state.record("execute", result).is_ok()
        })
    }

    /// Flag an error raised outside the database core, such as a host-side
    /// argument check.
    pub fn flag_error(&self, err: BridgeError) {
        self.runtime.block_on(async {
            let _ = self.state.lock().await.record::<()>("host", Err(err));
        })
    }

    /// The most recently flagged error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.runtime
            .block_on(async { self.state.lock().await.last_error.clone() })
    }

    /// Take and clear the most recently flagged error message.
    pub fn take_error(&self) -> Option<String> {
        self.runtime
            .block_on(async { self.state.lock().await.last_error.take() })
    }

    /// Number of statements currently cached.
    pub fn cached_statements(&self) -> usize {
        self.runtime
            .block_on(async { self.state.lock().await.cache.len() })
    }
}

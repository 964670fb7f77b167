use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};

use crate::drivers::BufferedCursor;
use crate::error::{DriverError, DriverResult};
use crate::traits::{
    DatabaseDriver, DriverConnection, DriverCursor, DriverPreparedStatement, DriverStatement,
};
use crate::types::{RawQueryResult, SqlValue};

type SharedConnection = Arc<Mutex<rusqlite::Connection>>;

/// SQLite driver implementation using rusqlite with bundled SQLite.
///
/// Accepted URLs: `sqlite::memory:`, `sqlite:<path>`, `sqlite://<path>`
/// or a bare filesystem path. Credentials are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }
}

/// Strip the URL scheme, leaving either `:memory:` or a path.
fn database_path(url: &str) -> &str {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if rest.is_empty() {
        ":memory:"
    } else {
        rest
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    async fn connect(
        &self,
        url: &str,
        _username: &str,
        _password: &str,
    ) -> DriverResult<Box<dyn DriverConnection>> {
        let path = database_path(url);
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };
        Ok(Box::new(SqliteConnection {
            conn: Mutex::new(Some(Arc::new(Mutex::new(conn)))),
        }))
    }
}

struct SqliteConnection {
    // Statements hold weak references, so dropping this Arc on close makes
    // every statement of the connection fail from then on.
    conn: Mutex<Option<SharedConnection>>,
}

impl SqliteConnection {
    fn shared(&self) -> DriverResult<SharedConnection> {
        lock(&self.conn)?
            .clone()
            .ok_or_else(|| DriverError::new("connection is closed"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> DriverResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DriverError::new("connection lock poisoned"))
}

fn upgrade(conn: &Weak<Mutex<rusqlite::Connection>>) -> DriverResult<SharedConnection> {
    conn.upgrade()
        .ok_or_else(|| DriverError::new("connection is closed"))
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn create_statement(&self) -> DriverResult<Arc<dyn DriverStatement>> {
        let conn = self.shared()?;
        Ok(Arc::new(SqliteStatement {
            conn: Arc::downgrade(&conn),
        }))
    }

    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn DriverPreparedStatement>> {
        let conn = self.shared()?;
        // rusqlite statements borrow their connection, so only the parameter
        // count is kept here and the statement is re-fetched from the
        // connection's statement cache on each execution.
        let count = lock(&conn)?.prepare_cached(sql)?.parameter_count();
        Ok(Box::new(SqlitePreparedStatement {
            conn: Arc::downgrade(&conn),
            sql: sql.to_string(),
            params: vec![None; count],
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        let conn = lock(&self.conn)?
            .take()
            .ok_or_else(|| DriverError::new("connection is already closed"))?;
        match Arc::try_unwrap(conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|_| DriverError::new("connection lock poisoned"))?;
                conn.close().map_err(|(_, e)| DriverError::from(e))
            }
            // A statement is mid-execution; the database closes when it finishes.
            Err(_) => Ok(()),
        }
    }
}

/// Rows changed by all statements since the connection opened.
fn total_changes(conn: &rusqlite::Connection) -> DriverResult<i64> {
    Ok(conn.query_row("SELECT total_changes()", [], |row| row.get(0))?)
}

/// Rows changed by the statement that just ran. `changes()` keeps the count
/// of the last INSERT, UPDATE or DELETE, so a DDL statement would otherwise
/// report that stale value.
fn affected_since(conn: &rusqlite::Connection, before: i64) -> DriverResult<u64> {
    if total_changes(conn)? == before {
        Ok(0)
    } else {
        Ok(conn.changes() as u64)
    }
}

/// Text rendering of one SQLite value.
fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(real_to_string(f)),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Render a REAL the way SQLite casts it to TEXT: 15 significant digits,
/// exponent form outside 1e-4..1e15, and always a decimal point.
fn real_to_string(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if f == 0.0 {
        return "0.0".to_string();
    }

    // `{:.14e}` rounds to 15 significant digits and yields the exponent
    // after rounding, e.g. "1.50000000000000e2".
    let scientific = format!("{:.14e}", f);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if (-4..15).contains(&exponent) {
        let decimals = (14 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, f))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.abs()
        )
    }
}

/// Drop trailing zeros after the decimal point, keeping at least one digit.
fn trim_fraction(number: &str) -> String {
    let trimmed = number.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{}0", trimmed)
    } else {
        trimmed.to_string()
    }
}

fn sql_value_to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Int32(i) => Value::Integer(i64::from(*i)),
        SqlValue::Int64(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Bytes(b) => Value::Blob(b.clone()),
    }
}

struct SqliteStatement {
    conn: Weak<Mutex<rusqlite::Connection>>,
}

#[async_trait]
impl DriverStatement for SqliteStatement {
    async fn execute_query(&self, sql: &str) -> DriverResult<Box<dyn DriverCursor>> {
        let conn = upgrade(&self.conn)?;
        let guard = lock(&conn)?;
        let mut stmt = guard.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(value_to_string(row.get_ref(i)?));
            }
            rows.push(values);
        }

        Ok(Box::new(BufferedCursor::new(RawQueryResult::new(
            columns, rows,
        ))))
    }

    async fn execute_update(&self, sql: &str) -> DriverResult<u64> {
        let conn = upgrade(&self.conn)?;
        let guard = lock(&conn)?;
        let before = total_changes(&guard)?;
        guard.execute(sql, [])?;
        affected_since(&guard, before)
    }
}

struct SqlitePreparedStatement {
    conn: Weak<Mutex<rusqlite::Connection>>,
    sql: String,
    params: Vec<Option<SqlValue>>,
}

#[async_trait]
impl DriverPreparedStatement for SqlitePreparedStatement {
    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    async fn set(&mut self, index: usize, value: SqlValue) -> DriverResult<()> {
        upgrade(&self.conn)?;
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
        let conn = upgrade(&self.conn)?;
        let guard = lock(&conn)?;
        let before = total_changes(&guard)?;
        let mut stmt = guard.prepare_cached(&self.sql)?;
        for (i, value) in self.params.iter().enumerate() {
            let value = value.as_ref().ok_or_else(|| {
                DriverError::new(format!("no value specified for parameter {}", i + 1))
            })?;
            stmt.raw_bind_parameter(i + 1, sql_value_to_sqlite(value))?;
        }

        // Step through any rows so SELECTs execute too.
        let mut rows = stmt.raw_query();
        while rows.next()?.is_some() {}
        drop(rows);
        drop(stmt);

        affected_since(&guard, before)
    }
}

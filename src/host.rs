//! Named, host-callable operations over dynamically typed values.
//!
//! A scripting host hands [`Bridge::invoke`] a function name and its
//! arguments as [`HostValue`]s. Failures never escape: the call returns a
//! sentinel and the message goes to the session's error channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::{Connection, PreparedStatementHandle, ResultCursor};
use crate::error::{BridgeError, Result};
use crate::session::Session;
use crate::types::{MaterializedRow, SqlValue};

/// A value as seen by the host runtime.
#[derive(Debug, Clone)]
pub enum HostValue {
    Empty,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<HostValue>),
    Hash(HashMap<String, HostValue>),
    Connection(Connection),
    Cursor(Arc<Mutex<ResultCursor>>),
    Statement(Arc<Mutex<PreparedStatementHandle>>),
    /// A by-reference slot, used as an out-parameter.
    Ref(Arc<Mutex<HostValue>>),
}

impl HostValue {
    pub fn str(value: impl Into<String>) -> Self {
        HostValue::Str(value.into())
    }

    /// A fresh out-parameter slot holding `Empty`.
    pub fn slot() -> Self {
        HostValue::Ref(Arc::new(Mutex::new(HostValue::Empty)))
    }

    /// The current content of a `Ref`, or a copy of any other value.
    pub fn deref_value(&self) -> HostValue {
        match self {
            HostValue::Ref(slot) => slot.blocking_lock().clone(),
            other => other.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, HostValue::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<String, HostValue>> {
        match self {
            HostValue::Hash(map) => Some(map),
            _ => None,
        }
    }

    /// Text form of a scalar, the way a script would stringify it.
    fn scalar_string(&self) -> Option<String> {
        match self {
            HostValue::Empty => Some(String::new()),
            HostValue::Bool(b) => Some(b.to_string()),
            HostValue::Int(i) => Some(i.to_string()),
            HostValue::Double(d) => Some(d.to_string()),
            HostValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HostValue::Empty => "empty",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Double(_) => "double",
            HostValue::Str(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Hash(_) => "hash",
            HostValue::Connection(_) => "connection",
            HostValue::Cursor(_) => "cursor",
            HostValue::Statement(_) => "statement",
            HostValue::Ref(_) => "reference",
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Empty, HostValue::Empty) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Double(a), HostValue::Double(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => a == b,
            (HostValue::Hash(a), HostValue::Hash(b)) => a == b,
            (HostValue::Connection(a), HostValue::Connection(b)) => a == b,
            (HostValue::Cursor(a), HostValue::Cursor(b)) => Arc::ptr_eq(a, b),
            (HostValue::Statement(a), HostValue::Statement(b)) => Arc::ptr_eq(a, b),
            (HostValue::Ref(a), HostValue::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

fn cell(value: Option<String>) -> HostValue {
    value.map(HostValue::Str).unwrap_or(HostValue::Empty)
}

/// Named rows become hashes and positional rows arrays; NULL cells are
/// `Empty`.
impl From<MaterializedRow> for HostValue {
    fn from(row: MaterializedRow) -> Self {
        match row {
            MaterializedRow::Named(row) => HostValue::Hash(
                row.into_map()
                    .into_iter()
                    .map(|(label, value)| (label, cell(value)))
                    .collect(),
            ),
            MaterializedRow::Positional(row) => {
                HostValue::Array(row.into_values().into_iter().map(cell).collect())
            }
        }
    }
}

fn host_row(row: impl Into<MaterializedRow>) -> HostValue {
    HostValue::from(row.into())
}

fn to_sql_value(value: &HostValue, position: usize) -> Result<SqlValue> {
    match value.deref_value() {
        HostValue::Empty => Ok(SqlValue::Null),
        HostValue::Bool(b) => Ok(SqlValue::Bool(b)),
        HostValue::Int(i) => Ok(SqlValue::Int64(i)),
        HostValue::Double(d) => Ok(SqlValue::Float(d)),
        HostValue::Str(s) => Ok(SqlValue::Text(s)),
        other => Err(BridgeError::InvalidArguments(format!(
            "argument {} cannot be sent to the database as a parameter ({})",
            position + 1,
            other.kind()
        ))),
    }
}

fn not_enough_arguments() -> BridgeError {
    BridgeError::InvalidArguments("Not enough arguments".to_string())
}

fn wrong_kind(position: usize, expected: &str, got: &HostValue) -> BridgeError {
    BridgeError::InvalidArguments(format!(
        "argument {} must be a {}, got {}",
        position + 1,
        expected,
        got.kind()
    ))
}

fn arg(args: &[HostValue], position: usize) -> Result<&HostValue> {
    args.get(position).ok_or_else(not_enough_arguments)
}

fn arg_string(args: &[HostValue], position: usize) -> Result<String> {
    let value = arg(args, position)?;
    value
        .scalar_string()
        .ok_or_else(|| wrong_kind(position, "scalar", value))
}

fn arg_index(args: &[HostValue], position: usize) -> Result<usize> {
    match arg(args, position)? {
        // Negative indexes become 0 and are rejected by the bind itself.
        HostValue::Int(i) => Ok(usize::try_from(*i).unwrap_or(0)),
        HostValue::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| BridgeError::InvalidArguments(format!("'{}' is not an index", s))),
        other => Err(wrong_kind(position, "number", other)),
    }
}

fn arg_connection(args: &[HostValue], position: usize) -> Result<&Connection> {
    match arg(args, position)? {
        HostValue::Connection(conn) => Ok(conn),
        other => Err(wrong_kind(position, "connection", other)),
    }
}

fn arg_cursor(args: &[HostValue], position: usize) -> Result<&Arc<Mutex<ResultCursor>>> {
    match arg(args, position)? {
        HostValue::Cursor(cursor) => Ok(cursor),
        other => Err(wrong_kind(position, "cursor", other)),
    }
}

fn arg_statement(
    args: &[HostValue],
    position: usize,
) -> Result<&Arc<Mutex<PreparedStatementHandle>>> {
    match arg(args, position)? {
        HostValue::Statement(stmt) => Ok(stmt),
        other => Err(wrong_kind(position, "prepared statement", other)),
    }
}

fn arg_slot(args: &[HostValue], position: usize) -> Result<&Arc<Mutex<HostValue>>> {
    match arg(args, position)? {
        HostValue::Ref(slot) => Ok(slot),
        other => Err(wrong_kind(position, "reference", other)),
    }
}

/// Host-visible database functions, in registration order.
pub const FUNCTIONS: &[&str] = &[
    "db_connect",
    "db_close",
    "db_query",
    "db_update",
    "db_fetch",
    "db_assign",
    "db_fetch_array",
    "db_assign_array",
    "db_fetch_buffered",
    "db_fetch_buffered_array",
    "db_prepare",
    "db_set",
    "db_exec",
    "db_execute",
    "db_fetched_rows",
];

/// Exposes a [`Session`] to a scripting host as named functions.
pub struct Bridge {
    session: Session,
}

impl Bridge {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Names the host should register.
    pub fn functions() -> &'static [&'static str] {
        FUNCTIONS
    }

    /// Call the function `name`. Errors are flagged on the session and
    /// answered with the function's sentinel value.
    pub fn invoke(&self, name: &str, args: &[HostValue]) -> HostValue {
        let result = match name {
            "db_connect" => self.connect(args),
            "db_close" => self.close(args),
            "db_query" => self.query(args),
            "db_update" => self.update(args),
            "db_fetch" => self.fetch(args),
            "db_assign" => self.assign(args),
            "db_fetch_array" => self.fetch_array(args),
            "db_assign_array" => self.assign_array(args),
            "db_fetch_buffered" => self.fetch_buffered(args),
            "db_fetch_buffered_array" => self.fetch_buffered_array(args),
            "db_prepare" => self.prepare(args),
            "db_set" => self.set(args),
            "db_exec" | "db_execute" => self.execute(args),
            "db_fetched_rows" => Ok(HostValue::Int(
                i64::try_from(self.session.fetched_rows()).unwrap_or(i64::MAX),
            )),
            _ => Err(BridgeError::InvalidArguments(format!(
                "unknown function '{}'",
                name
            ))),
        };

        match result {
            Ok(value) => value,
            Err(err) => {
                // Session operations flag their own failures.
                if let BridgeError::InvalidArguments(_) = err {
                    self.session.flag_error(err);
                }
                Self::sentinel(name)
            }
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.last_error()
    }

    pub fn take_error(&self) -> Option<String> {
        self.session.take_error()
    }

    fn sentinel(name: &str) -> HostValue {
        match name {
            "db_update" | "db_fetched_rows" => HostValue::Int(0),
            "db_set" | "db_exec" | "db_execute" => HostValue::Bool(false),
            _ => HostValue::Empty,
        }
    }

    fn connect(&self, args: &[HostValue]) -> Result<HostValue> {
        let driver = arg_string(args, 0)?;
        let url = arg_string(args, 1)?;
        let username = arg_string(args, 2)?;
        let password = arg_string(args, 3)?;
        let conn = self.session.connect(&driver, &url, &username, &password)?;
        Ok(HostValue::Connection(conn))
    }

    fn close(&self, args: &[HostValue]) -> Result<HostValue> {
        self.session.close(arg_connection(args, 0)?)?;
        Ok(HostValue::Empty)
    }

    fn query(&self, args: &[HostValue]) -> Result<HostValue> {
        let conn = arg_connection(args, 0)?;
        let sql = arg_string(args, 1)?;
        let cursor = self.session.query(conn, &sql)?;
        Ok(HostValue::Cursor(Arc::new(Mutex::new(cursor))))
    }

    fn update(&self, args: &[HostValue]) -> Result<HostValue> {
        let conn = arg_connection(args, 0)?;
        let sql = arg_string(args, 1)?;
        let affected = self.session.update(conn, &sql)?;
        Ok(HostValue::Int(i64::try_from(affected).unwrap_or(i64::MAX)))
    }

    fn fetch(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut cursor = arg_cursor(args, 0)?.blocking_lock();
        let row = self.session.fetch(&mut cursor)?;
        Ok(row.map(host_row).unwrap_or(HostValue::Empty))
    }

    fn fetch_array(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut cursor = arg_cursor(args, 0)?.blocking_lock();
        let row = self.session.fetch_array(&mut cursor)?;
        Ok(row.map(host_row).unwrap_or(HostValue::Empty))
    }

    fn assign(&self, args: &[HostValue]) -> Result<HostValue> {
        let slot = arg_slot(args, 1)?;
        let value = self.fetch(args)?;
        *slot.blocking_lock() = value.clone();
        Ok(value)
    }

    fn assign_array(&self, args: &[HostValue]) -> Result<HostValue> {
        let slot = arg_slot(args, 1)?;
        let value = self.fetch_array(args)?;
        *slot.blocking_lock() = value.clone();
        Ok(value)
    }

    fn fetch_buffered(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut cursor = arg_cursor(args, 0)?.blocking_lock();
        let rows = self.session.fetch_buffered(&mut cursor)?;
        Ok(HostValue::Array(rows.into_iter().map(host_row).collect()))
    }

    fn fetch_buffered_array(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut cursor = arg_cursor(args, 0)?.blocking_lock();
        let rows = self.session.fetch_buffered_array(&mut cursor)?;
        Ok(HostValue::Array(rows.into_iter().map(host_row).collect()))
    }

    fn prepare(&self, args: &[HostValue]) -> Result<HostValue> {
        let conn = arg_connection(args, 0)?;
        let sql = arg_string(args, 1)?;
        let params = args[2..]
            .iter()
            .enumerate()
            .map(|(i, value)| to_sql_value(value, i + 2))
            .collect::<Result<Vec<_>>>()?;
        let handle = self.session.prepare(conn, &sql, &params)?;
        Ok(HostValue::Statement(Arc::new(Mutex::new(handle))))
    }

    fn set(&self, args: &[HostValue]) -> Result<HostValue> {
        let stmt = arg_statement(args, 0)?;
        let index = arg_index(args, 1)?;
        let value = to_sql_value(arg(args, 2)?, 2)?;
        let mut handle = stmt.blocking_lock();
        Ok(HostValue::Bool(self.session.bind(&mut handle, index, value)))
    }

    fn execute(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut handle = arg_statement(args, 0)?.blocking_lock();
        Ok(HostValue::Bool(self.session.execute(&mut handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NamedRow, PositionalRow};

    #[test]
    fn test_scalar_conversion_to_sql() {
        assert_eq!(to_sql_value(&HostValue::Empty, 0).unwrap(), SqlValue::Null);
        assert_eq!(to_sql_value(&HostValue::Int(4), 0).unwrap(), SqlValue::Int64(4));
        assert_eq!(
            to_sql_value(&HostValue::str("Ann"), 0).unwrap(),
            SqlValue::Text("Ann".to_string())
        );
        let err = to_sql_value(&HostValue::Array(Vec::new()), 2).unwrap_err();
        assert_eq!(
            err.message(),
            "argument 3 cannot be sent to the database as a parameter (array)"
        );
    }

    #[test]
    fn test_rows_become_host_containers() {
        let mut row = NamedRow::new();
        row.insert("id", Some("1".to_string()));
        row.insert("nickname", None);
        let hash = host_row(row);
        let map = hash.as_hash().unwrap();
        assert_eq!(map["id"], HostValue::str("1"));
        assert!(map["nickname"].is_empty());

        let array = host_row(PositionalRow::from(vec![Some("1".to_string()), None]));
        assert_eq!(
            array.as_array().unwrap(),
            &[HostValue::str("1"), HostValue::Empty]
        );
    }

    #[test]
    fn test_argument_helpers() {
        let args = [HostValue::Int(2), HostValue::str(" 3 "), HostValue::Int(-1)];
        assert_eq!(arg_string(&args, 0).unwrap(), "2");
        assert_eq!(arg_index(&args, 1).unwrap(), 3);
        assert_eq!(arg_index(&args, 2).unwrap(), 0);
        assert_eq!(arg(&args, 3).unwrap_err(), not_enough_arguments());
        assert_eq!(
            arg_connection(&args, 0).unwrap_err().message(),
            "argument 1 must be a connection, got int"
        );
    }

    #[test]
    fn test_slot_deref() {
        let slot = HostValue::slot();
        assert!(slot.deref_value().is_empty());
        if let HostValue::Ref(inner) = &slot {
            *inner.blocking_lock() = HostValue::Int(1);
        }
        assert_eq!(slot.deref_value(), HostValue::Int(1));
        assert_eq!(HostValue::from(true).as_bool(), Some(true));
    }
}

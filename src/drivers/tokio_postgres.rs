use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use bytes::BytesMut;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow, Statement};

use crate::error::{DriverError, DriverResult};
use crate::traits::{
    DatabaseDriver, DriverConnection, DriverCursor, DriverPreparedStatement, DriverStatement,
};
use crate::types::SqlValue;

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Ad-hoc queries use the simple-query protocol, which returns every value
/// as text. Prepared statements use the extended protocol with typed binds.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPostgresDriver;

impl TokioPostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

/// Build a connection config from a URL or key/value string, letting
/// non-empty credentials override what the URL carries.
fn connection_config(url: &str, username: &str, password: &str) -> DriverResult<Config> {
    let mut config: Config = url.parse()?;
    if !username.is_empty() {
        config.user(username);
    }
    if !password.is_empty() {
        config.password(password);
    }
    Ok(config)
}

#[async_trait]
impl DatabaseDriver for TokioPostgresDriver {
    async fn connect(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> DriverResult<Box<dyn DriverConnection>> {
        let config = connection_config(url, username, password)?;
        let (client, connection) = config.connect(NoTls).await?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PgConnection {
            client: Mutex::new(Some(Arc::new(client))),
        }))
    }
}

struct PgConnection {
    // Statements hold weak references. Dropping the last strong reference
    // on close ends the background connection task.
    client: Mutex<Option<Arc<Client>>>,
}

impl PgConnection {
    fn client(&self) -> DriverResult<Arc<Client>> {
        self.client
            .lock()
            .map_err(|_| DriverError::new("connection lock poisoned"))?
            .clone()
            .ok_or_else(|| DriverError::new("connection is closed"))
    }
}

fn upgrade(client: &Weak<Client>) -> DriverResult<Arc<Client>> {
    client
        .upgrade()
        .filter(|c| !c.is_closed())
        .ok_or_else(|| DriverError::new("connection is closed"))
}

#[async_trait]
impl DriverConnection for PgConnection {
    async fn create_statement(&self) -> DriverResult<Arc<dyn DriverStatement>> {
        let client = self.client()?;
        Ok(Arc::new(PgStatement {
            client: Arc::downgrade(&client),
        }))
    }

    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn DriverPreparedStatement>> {
        let client = self.client()?;
        let statement = client.prepare(sql).await?;
        let count = statement.params().len();
        Ok(Box::new(PgPreparedStatement {
            client: Arc::downgrade(&client),
            statement,
            params: vec![None; count],
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.client
            .lock()
            .map_err(|_| DriverError::new("connection lock poisoned"))?
            .take()
            .map(drop)
            .ok_or_else(|| DriverError::new("connection is already closed"))
    }
}

struct PgStatement {
    client: Weak<Client>,
}

#[async_trait]
impl DriverStatement for PgStatement {
    async fn execute_query(&self, sql: &str) -> DriverResult<Box<dyn DriverCursor>> {
        let client = upgrade(&self.client)?;
        let messages = client.simple_query(sql).await?;
        Ok(Box::new(PgCursor::new(messages)))
    }

    async fn execute_update(&self, sql: &str) -> DriverResult<u64> {
        let client = upgrade(&self.client)?;
        let messages = client.simple_query(sql).await?;
        Ok(affected_rows(&messages))
    }
}

/// Affected-row count of the last command in a simple-query response.
fn affected_rows(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .rev()
        .find_map(|m| match m {
            SimpleQueryMessage::CommandComplete(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(0)
}

/// Cursor over the text rows of a simple query.
struct PgCursor {
    columns: Vec<String>,
    pending: VecDeque<SimpleQueryRow>,
    current: Option<SimpleQueryRow>,
}

impl PgCursor {
    fn new(messages: Vec<SimpleQueryMessage>) -> Self {
        let pending: VecDeque<SimpleQueryRow> = messages
            .into_iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect();
        let columns = pending
            .front()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        Self {
            columns,
            pending,
            current: None,
        }
    }
}

#[async_trait]
impl DriverCursor for PgCursor {
    async fn next(&mut self) -> DriverResult<bool> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn column_count(&self) -> DriverResult<usize> {
        Ok(self.columns.len())
    }

    fn column_label(&self, index: usize) -> DriverResult<String> {
        self.columns
            .get(index)
            .cloned()
            .ok_or_else(|| DriverError::new(format!("column index {} out of range", index)))
    }

    fn get_string(&self, index: usize) -> DriverResult<Option<String>> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::new("cursor is not positioned on a row"))?;
        Ok(row.try_get(index)?.map(str::to_string))
    }
}

struct PgPreparedStatement {
    client: Weak<Client>,
    statement: Statement,
    params: Vec<Option<PgParam>>,
}

#[async_trait]
impl DriverPreparedStatement for PgPreparedStatement {
    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    async fn set(&mut self, index: usize, value: SqlValue) -> DriverResult<()> {
        let count = self.params.len();
        let ty = index
            .checked_sub(1)
            .and_then(|i| self.statement.params().get(i))
            .ok_or_else(|| {
                DriverError::new(format!(
                    "parameter index {} out of range (statement has {} parameters)",
                    index, count
                ))
            })?;
        let param = coerce_for_type(value, ty)?;
        self.params[index - 1] = Some(param);
        Ok(())
    }

    async fn execute(&mut self) -> DriverResult<u64> {
        let client = upgrade(&self.client)?;
        let mut param_refs: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(self.params.len());
        for (i, param) in self.params.iter().enumerate() {
            let param = param.as_ref().ok_or_else(|| {
                DriverError::new(format!("no value specified for parameter {}", i + 1))
            })?;
            param_refs.push(param.as_sql());
        }

        Ok(client.execute(&self.statement, &param_refs).await?)
    }
}

/// A NULL that the server may assign to a parameter of any type.
#[derive(Debug)]
struct UntypedNull;

impl ToSql for UntypedNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// A parameter value already converted to the Rust type its column expects.
#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    Null,
    Text(String),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl PgParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::Null => &UntypedNull,
            PgParam::Text(s) => s,
            PgParam::Int2(i) => i,
            PgParam::Int4(i) => i,
            PgParam::Int8(i) => i,
            PgParam::Float4(f) => f,
            PgParam::Float8(f) => f,
            PgParam::Numeric(d) => d,
            PgParam::Bool(b) => b,
            PgParam::Bytes(b) => b,
        }
    }
}

/// Convert `value` for a parameter of type `ty`. Integers and floats are
/// widened or narrowed to the parameter's numeric type; anything else must
/// match as is.
fn coerce_for_type(value: SqlValue, ty: &Type) -> DriverResult<PgParam> {
    let param = match value {
        SqlValue::Null => PgParam::Null,
        SqlValue::Int32(i) => match coerce_integer(i64::from(i), ty) {
            Some(param) => param?,
            None => return Err(mismatch(&value, ty)),
        },
        SqlValue::Int64(i) => match coerce_integer(i, ty) {
            Some(param) => param?,
            None => return Err(mismatch(&value, ty)),
        },
        SqlValue::Float(f) if *ty == Type::FLOAT8 => PgParam::Float8(f),
        SqlValue::Float(f) if *ty == Type::FLOAT4 => {
            let narrowed = f as f32;
            if f.is_finite() && !narrowed.is_finite() {
                return Err(out_of_range(f, ty));
            }
            PgParam::Float4(narrowed)
        }
        SqlValue::Float(f) if *ty == Type::NUMERIC => {
            // Shortest round-trip text, so 0.1 stays 0.1.
            let decimal = f
                .to_string()
                .parse::<Decimal>()
                .map_err(|_| out_of_range(f, ty))?;
            PgParam::Numeric(decimal)
        }
        SqlValue::Text(s) if <String as ToSql>::accepts(ty) => PgParam::Text(s),
        SqlValue::Bool(b) if <bool as ToSql>::accepts(ty) => PgParam::Bool(b),
        SqlValue::Bytes(b) if <Vec<u8> as ToSql>::accepts(ty) => PgParam::Bytes(b),
        other => return Err(mismatch(&other, ty)),
    };
    Ok(param)
}

/// `None` if `ty` is not numeric.
fn coerce_integer(i: i64, ty: &Type) -> Option<DriverResult<PgParam>> {
    let param = if *ty == Type::INT2 {
        i16::try_from(i).map(PgParam::Int2).map_err(|_| out_of_range(i, ty))
    } else if *ty == Type::INT4 {
        i32::try_from(i).map(PgParam::Int4).map_err(|_| out_of_range(i, ty))
    } else if *ty == Type::INT8 {
        Ok(PgParam::Int8(i))
    } else if *ty == Type::FLOAT4 {
        Ok(PgParam::Float4(i as f32))
    } else if *ty == Type::FLOAT8 {
        Ok(PgParam::Float8(i as f64))
    } else if *ty == Type::NUMERIC {
        Ok(PgParam::Numeric(Decimal::from(i)))
    } else {
        return None;
    };
    Some(param)
}

fn out_of_range(shown: impl std::fmt::Display, ty: &Type) -> DriverError {
    DriverError::new(format!("value {} out of range for {}", shown, ty))
}

fn mismatch(value: &SqlValue, ty: &Type) -> DriverError {
    DriverError::new(format!(
        "cannot bind {} value to parameter of type {}",
        value.kind(),
        ty
    ))
}

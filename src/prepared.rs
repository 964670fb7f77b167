//! Parameterized statements: prepare, bind by 1-based index, execute.

use crate::connection::{Connection, PreparedStatementHandle};
use crate::error::{BridgeError, Result};
use crate::types::SqlValue;

/// Compile `sql` on `connection` and bind `initial_params` to 1..=n.
///
/// Any failure, including a rejected initial bind, fails the whole call and
/// no handle is returned.
pub async fn prepare(
    connection: &Connection,
    sql: &str,
    initial_params: &[SqlValue],
) -> Result<PreparedStatementHandle> {
    let mut inner = connection
        .driver_connection()
        .prepare(sql)
        .await
        .map_err(|e| BridgeError::Prepare(e.into_message()))?;

    for (i, value) in initial_params.iter().enumerate() {
        inner
            .set(i + 1, value.clone())
            .await
            .map_err(|e| BridgeError::Prepare(e.into_message()))?;
    }

    tracing::debug!(
        connection = %connection.id(),
        params = initial_params.len(),
        "prepared statement"
    );
    Ok(PreparedStatementHandle::new(connection.id(), sql, inner))
}

/// Set the parameter at the 1-based `index`.
pub async fn bind(
    handle: &mut PreparedStatementHandle,
    index: usize,
    value: SqlValue,
) -> Result<()> {
    if index == 0 {
        return Err(BridgeError::Bind("parameter indexes start at 1".to_string()));
    }
    handle
        .driver_statement()
        .set(index, value)
        .await
        .map_err(|e| BridgeError::Bind(e.into_message()))
}

/// Run the statement with its current bindings.
/// Returns the affected-row count; the fetched-row counter is not touched.
pub async fn execute(handle: &mut PreparedStatementHandle) -> Result<u64> {
    let affected = handle
        .driver_statement()
        .execute()
        .await
        .map_err(|e| BridgeError::Execute(e.into_message()))?;
    tracing::debug!(
        connection = %handle.connection_id(),
        sql = handle.sql(),
        affected,
        "executed prepared statement"
    );
    Ok(affected)
}

//! Ad-hoc SQL execution through the per-connection cached statement.

use crate::cache::StatementCache;
use crate::connection::{Connection, ResultCursor};
use crate::counter::FetchedRowCounter;
use crate::error::{BridgeError, Result};

/// Run `sql` as a query and hand the cursor to the caller.
///
/// The fetched-row counter is not touched.
pub async fn run_query(
    cache: &mut StatementCache,
    connection: &Connection,
    sql: &str,
) -> Result<ResultCursor> {
    let stmt = cache.get_or_create(connection).await?;
    let cursor = stmt
        .execute_query(sql)
        .await
        .map_err(|e| BridgeError::Query(e.into_message()))?;
    Ok(ResultCursor::new(connection.id(), cursor))
}

/// Run `sql` as an update and return the affected-row count.
///
/// The counter is reset before anything else, so a failed update leaves it at
/// zero rather than at a stale value.
pub async fn run_update(
    cache: &mut StatementCache,
    counter: &mut FetchedRowCounter,
    connection: &Connection,
    sql: &str,
) -> Result<u64> {
    counter.reset();
    let stmt = cache.get_or_create(connection).await?;
    let affected = stmt
        .execute_update(sql)
        .await
        .map_err(|e| BridgeError::Update(e.into_message()))?;
    counter.set(affected);
    tracing::debug!(connection = %connection.id(), affected, "update complete");
    Ok(affected)
}

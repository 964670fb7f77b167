//! Conversion of cursor rows into caller-facing rows.
//!
//! Every column is read as text. Metadata is re-read for each row; it is
//! cheap and stable for the life of a cursor.

use crate::connection::ResultCursor;
use crate::counter::FetchedRowCounter;
use crate::error::{BridgeError, DriverError, Result};
use crate::traits::DriverCursor;
use crate::types::{NamedRow, PositionalRow};

fn row_fetch(err: DriverError) -> BridgeError {
    BridgeError::RowFetch(err.into_message())
}

async fn advance(cursor: &mut dyn DriverCursor) -> Result<bool> {
    cursor.next().await.map_err(row_fetch)
}

/// Advance one row and key its values by column label.
///
/// Returns `Ok(None)` at end of data. When two columns share a label the later
/// one wins.
pub async fn next_row_as_map(cursor: &mut ResultCursor) -> Result<Option<NamedRow>> {
    let cursor = cursor.driver_cursor();
    if !advance(cursor).await? {
        return Ok(None);
    }

    let count = cursor.column_count().map_err(row_fetch)?;
    let mut row = NamedRow::with_capacity(count);
    for i in 0..count {
        let label = cursor.column_label(i).map_err(row_fetch)?;
        let value = cursor.get_string(i).map_err(row_fetch)?;
        row.insert(label, value);
    }
    Ok(Some(row))
}

/// Advance one row and collect its values in column order.
pub async fn next_row_as_sequence(cursor: &mut ResultCursor) -> Result<Option<PositionalRow>> {
    let cursor = cursor.driver_cursor();
    if !advance(cursor).await? {
        return Ok(None);
    }

    let count = cursor.column_count().map_err(row_fetch)?;
    let mut row = PositionalRow::with_capacity(count);
    for i in 0..count {
        row.push(cursor.get_string(i).map_err(row_fetch)?);
    }
    Ok(Some(row))
}

/// Drain the cursor into label-keyed rows, counting each one.
///
/// Fails as a whole: rows read before an error are discarded and the counter
/// goes back to zero.
pub async fn fetch_all_as_maps(
    cursor: &mut ResultCursor,
    counter: &mut FetchedRowCounter,
) -> Result<Vec<NamedRow>> {
    counter.reset();
    let mut rows = Vec::new();
    loop {
        match next_row_as_map(cursor).await {
            Ok(Some(row)) => {
                rows.push(row);
                counter.increment();
            }
            Ok(None) => break,
            Err(e) => {
                counter.reset();
                return Err(e);
            }
        }
    }
    tracing::debug!(rows = rows.len(), "buffered fetch complete");
    Ok(rows)
}

/// Drain the cursor into positional rows, counting each one.
pub async fn fetch_all_as_sequences(
    cursor: &mut ResultCursor,
    counter: &mut FetchedRowCounter,
) -> Result<Vec<PositionalRow>> {
    counter.reset();
    let mut rows = Vec::new();
    loop {
        match next_row_as_sequence(cursor).await {
            Ok(Some(row)) => {
                rows.push(row);
                counter.increment();
            }
            Ok(None) => break,
            Err(e) => {
                counter.reset();
                return Err(e);
            }
        }
    }
    tracing::debug!(rows = rows.len(), "buffered fetch complete");
    Ok(rows)
}

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::{DriverError, DriverResult};
use crate::traits::DriverCursor;
use crate::types::RawQueryResult;

/// Cursor over a result the driver already materialized.
///
/// Drivers whose native rows borrow the connection (SQLite) or arrive all at
/// once read into a `RawQueryResult` and hand it out through this cursor.
pub struct BufferedCursor {
    columns: Vec<String>,
    pending: VecDeque<Vec<Option<String>>>,
    current: Option<Vec<Option<String>>>,
    fail_at: Option<(usize, String)>,
    advanced: usize,
}

impl BufferedCursor {
    pub fn new(result: RawQueryResult) -> Self {
        Self {
            columns: result.columns,
            pending: result.rows.into(),
            current: None,
            fail_at: None,
            advanced: 0,
        }
    }

    /// Make the advance onto the zero-based row `row` fail with `message`.
    pub fn failing_at(mut self, row: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((row, message.into()));
        self
    }
}

#[async_trait]
impl DriverCursor for BufferedCursor {
    async fn next(&mut self) -> DriverResult<bool> {
        if let Some((row, message)) = &self.fail_at {
            if *row == self.advanced {
                return Err(DriverError::new(message.clone()));
            }
        }
        self.current = self.pending.pop_front();
        if self.current.is_some() {
            self.advanced += 1;
        }
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
        row.get(index)
            .cloned()
            .ok_or_else(|| DriverError::new(format!("column index {} out of range", index)))
    }
}

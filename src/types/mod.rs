mod row;
mod sql_value;

pub use row::{MaterializedRow, NamedRow, PositionalRow, RawQueryResult};
pub use sql_value::SqlValue;

mod driver;

pub use driver::{
    DatabaseDriver, DriverConnection, DriverCursor, DriverPreparedStatement, DriverStatement,
};

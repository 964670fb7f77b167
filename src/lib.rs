//! dbbridge - blocking, driver-agnostic database access for scripting hosts
//!
//! Connections, ad-hoc queries and updates, row fetching by label or by
//! position, buffered fetches with a row counter, and prepared statements
//! with 1-based parameter binding. Drivers are selected by identifier at
//! runtime; PostgreSQL and SQLite are built in.
//!
//! # Example
//! ```
//! use dbbridge::{Session, SqlValue};
//!
//! let session = Session::new().unwrap();
//! let conn = session.connect("org.sqlite.JDBC", "sqlite::memory:", "", "").unwrap();
//! session
//!     .update(&conn, "CREATE TABLE people (id INTEGER, name TEXT)")
//!     .unwrap();
//!
//! let mut insert = session
//!     .prepare(&conn, "INSERT INTO people VALUES (?, ?)", &[SqlValue::from(1)])
//!     .unwrap();
//! assert!(session.bind(&mut insert, 2, "Ann"));
//! assert!(session.execute(&mut insert));
//!
//! let mut cursor = session.query(&conn, "SELECT id, name FROM people").unwrap();
//! let row = session.fetch(&mut cursor).unwrap().unwrap();
//! assert_eq!(row.get("name").unwrap(), Some("Ann"));
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod counter;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod host;
pub mod materializer;
pub mod prepared;
pub mod traits;
pub mod types;

mod logging;
mod session;

// Re-export main types for convenient access
pub use cache::{StatementCache, DEFAULT_STATEMENT_CACHE_CAPACITY};
pub use config::BridgeConfig;
pub use connection::{Connection, ConnectionId, PreparedStatementHandle, ResultCursor};
pub use counter::FetchedRowCounter;
pub use drivers::DriverRegistry;
pub use error::{BridgeError, DriverError, Result};
pub use host::{Bridge, HostValue};
pub use logging::init_logging;
pub use session::Session;
pub use traits::{
    DatabaseDriver, DriverConnection, DriverCursor, DriverPreparedStatement, DriverStatement,
};
pub use types::{MaterializedRow, NamedRow, PositionalRow, RawQueryResult, SqlValue};

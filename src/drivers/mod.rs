mod buffered;
mod in_memory_test;
mod registry;
mod sqlite;
mod tokio_postgres;

pub use self::buffered::BufferedCursor;
pub use self::in_memory_test::{
    InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedQuery, StatementKind,
};
pub use self::registry::DriverRegistry;
pub use self::sqlite::SqliteDriver;
pub use self::tokio_postgres::TokioPostgresDriver;

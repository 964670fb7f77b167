use thiserror::Error;

/// Error type for dbbridge operations.
///
/// Every database variant carries the driver's message verbatim; the variant
/// names the operation that failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Driver not available: {0}")]
    DriverLoad(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Statement creation failed: {0}")]
    StatementCreation(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Update failed: {0}")]
    Update(String),

    #[error("Row fetch failed: {0}")]
    RowFetch(String),

    #[error("Prepare failed: {0}")]
    Prepare(String),

    #[error("Bind failed: {0}")]
    Bind(String),

    #[error("Execute failed: {0}")]
    Execute(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// The underlying message without the operation prefix.
    pub fn message(&self) -> &str {
        match self {
            BridgeError::DriverLoad(m)
            | BridgeError::Connection(m)
            | BridgeError::StatementCreation(m)
            | BridgeError::Query(m)
            | BridgeError::Update(m)
            | BridgeError::RowFetch(m)
            | BridgeError::Prepare(m)
            | BridgeError::Bind(m)
            | BridgeError::Execute(m)
            | BridgeError::ColumnNotFound(m)
            | BridgeError::InvalidArguments(m)
            | BridgeError::Config(m) => m,
        }
    }
}

/// Failure reported by a driver implementation.
///
/// Drivers don't know which bridge operation they are serving, so they report
/// a bare message and the core classifies it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn into_message(self) -> String {
        self.0
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(err: tokio_postgres::Error) -> Self {
        // The Display impl of a server error omits the detail; prefer the
        // database message when there is one.
        match err.as_db_error() {
            Some(db) => DriverError(db.message().to_string()),
            None => DriverError(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        DriverError(err.to_string())
    }
}

/// Result type alias for dbbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result type alias for driver implementations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

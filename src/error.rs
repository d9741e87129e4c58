use thiserror::Error;

/// Failure reported by the underlying driver, passed through untouched.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Raised while turning a statement tree into SQL text and arguments.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("A value is required for bind parameter {0:?}")]
    MissingBind(String),
    #[error("Unknown column {0:?}")]
    UnknownColumn(String),
    #[error("Invalid value for {column:?}: {reason}")]
    InvalidValue { column: String, reason: String },
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Expected result {expected:?}, got {actual:?}")]
    UnexpectedResult { expected: String, actual: String },

    #[error(transparent)]
    Driver(DriverError),
}

impl Error {
    /// The driver error, when the statement reached the database and failed there.
    pub fn as_driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Driver(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// The `tokio_postgres` error behind a driver failure, if that is what it was.
    pub fn as_postgres_error(&self) -> Option<&tokio_postgres::Error> {
        self.as_driver_error()?.downcast_ref()
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Error::Driver(Box::new(err))
    }
}

/// Raised when a statement cannot be rendered for a log record. Never
/// surfaced to callers; the statement still runs.
#[derive(Debug, Error)]
#[error("Unable to render SQL for logging: {0}")]
pub struct InstrumentationError(pub String);

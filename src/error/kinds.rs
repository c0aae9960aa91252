use std::time::Duration;
use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`DocshiftError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, DocshiftError>;

/// Top-level error type for docshift operations.
///
/// Connection and enumeration errors are fatal for the enclosing run or
/// check. Read and write errors are recoverable and only ever surface inside
/// a single collection's report.
#[derive(Debug)]
pub enum DocshiftError {
    /// Opening or using a connection failed.
    Connection(ConnectionError),

    /// Listing databases or collections failed after a successful open.
    Enumeration(EnumerationError),

    /// Reading documents from a collection failed.
    Read(ReadError),

    /// Bulk insert into a collection failed.
    Write(WriteError),

    /// A single store call exceeded the configured operation timeout.
    OperationTimeout { operation: String, timeout: Duration },

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed { role: String, message: String },

    /// Connection attempt exceeded the connect timeout.
    Timeout { role: String, seconds: u64 },

    /// Invalid connection URI.
    InvalidUri(String),

    /// Liveness round-trip after connecting failed.
    PingFailed { role: String, message: String },

    /// The connection has already been closed.
    NotConnected(String),
}

/// Failure to enumerate databases or collections.
#[derive(Debug)]
pub struct EnumerationError {
    /// Role of the connection that was being enumerated (source, target...)
    pub role: String,

    /// What was being listed ("collections", "databases")
    pub what: String,

    /// Underlying message
    pub message: String,
}

/// Failure to read documents out of a collection.
#[derive(Debug)]
pub struct ReadError {
    pub collection: String,
    pub message: String,
}

/// Bulk insert failure.
///
/// Inserts are ordered, so `inserted` documents before the first failing
/// one were written before the store gave up. `None` when the store could
/// not say how far the batch got.
#[derive(Debug)]
pub struct WriteError {
    pub collection: String,
    pub inserted: Option<u64>,
    pub message: String,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// A named datasource is not defined in the config file.
    UnknownDatasource { name: String, available: Vec<String> },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DocshiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocshiftError::Connection(e) => write!(f, "Connection error: {e}"),
            DocshiftError::Enumeration(e) => write!(f, "Enumeration error: {e}"),
            DocshiftError::Read(e) => write!(f, "{e}"),
            DocshiftError::Write(e) => write!(f, "{e}"),
            DocshiftError::OperationTimeout { operation, timeout } => {
                write!(f, "{operation} timed out after {timeout:?}")
            }
            DocshiftError::Config(e) => write!(f, "Configuration error: {e}"),
            DocshiftError::Io(e) => write!(f, "I/O error: {e}"),
            DocshiftError::MongoDb(e) => format_mongodb_error(f, e),
            DocshiftError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed { role, message } => {
                write!(f, "Failed to connect to {role}: {message}")
            }
            ConnectionError::Timeout { role, seconds } => {
                write!(f, "Connecting to {role} timed out after {seconds}s")
            }
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::PingFailed { role, message } => {
                write!(f, "Ping to {role} failed: {message}")
            }
            ConnectionError::NotConnected(role) => {
                write!(f, "Connection to {role} is already closed")
            }
        }
    }
}

impl fmt::Display for EnumerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to list {} on {}: {}",
            self.what, self.role, self.message
        )
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to read {}: {}", self.collection, self.message)
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::UnknownDatasource { name, available } => {
                if available.is_empty() {
                    write!(f, "Datasource '{name}' not found (no datasources configured)")
                } else {
                    write!(
                        f,
                        "Datasource '{name}' not found (available: {})",
                        available.join(", ")
                    )
                }
            }
        }
    }
}

impl std::error::Error for DocshiftError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for EnumerationError {}
impl std::error::Error for ReadError {}
impl std::error::Error for WriteError {}
impl std::error::Error for ConfigError {}

impl DocshiftError {
    /// Whether this error ends the enclosing run rather than a single
    /// collection.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DocshiftError::Read(_)
                | DocshiftError::Write(_)
                | DocshiftError::OperationTimeout { .. }
        )
    }
}

/* ========================= Conversions to DocshiftError ========================= */

impl From<io::Error> for DocshiftError {
    fn from(err: io::Error) -> Self {
        DocshiftError::Io(err)
    }
}

impl From<mongodb::error::Error> for DocshiftError {
    fn from(err: mongodb::error::Error) -> Self {
        DocshiftError::MongoDb(err)
    }
}

impl From<ConnectionError> for DocshiftError {
    fn from(err: ConnectionError) -> Self {
        DocshiftError::Connection(err)
    }
}

impl From<EnumerationError> for DocshiftError {
    fn from(err: EnumerationError) -> Self {
        DocshiftError::Enumeration(err)
    }
}

impl From<ReadError> for DocshiftError {
    fn from(err: ReadError) -> Self {
        DocshiftError::Read(err)
    }
}

impl From<WriteError> for DocshiftError {
    fn from(err: WriteError) -> Self {
        DocshiftError::Write(err)
    }
}

impl From<ConfigError> for DocshiftError {
    fn from(err: ConfigError) -> Self {
        DocshiftError::Config(err)
    }
}

impl From<String> for DocshiftError {
    fn from(msg: String) -> Self {
        DocshiftError::Generic(msg)
    }
}

impl From<&str> for DocshiftError {
    fn from(msg: &str) -> Self {
        DocshiftError::Generic(msg.to_owned())
    }
}

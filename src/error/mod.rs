//! Error handling for migration, inventory and verification runs.
//!
//! Errors fall into two groups:
//! - fatal errors (connection, enumeration, configuration) that end the
//!   enclosing run or check
//! - per-collection errors (read, write, operation timeout) that are
//!   recorded in a collection report and never propagate further
//!
//! MongoDB driver errors are condensed through [`mongo::extract_error_info`]
//! so reports show the server's error name and code.

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, DocshiftError, EnumerationError, ReadError, Result, WriteError,
};
pub use mongo::{ErrorDetails, ErrorInfo};

//! docshift library
//!
//! Copies every collection of a MongoDB database into another database,
//! reports what both sides contain and spot-checks copied collections.
//! The binary is a thin wrapper around these modules; they can be used
//! directly to embed a migration in another tool.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Connection descriptors, opening and closing connections
//! - `error`: Error types and handling
//! - `formatter`: Tables, summaries and JSON rendering
//! - `inventory`: Database and collection discovery
//! - `migrate`: Bulk copy with per-collection isolation
//! - `store`: Document store abstraction (MongoDB and in-memory)
//! - `verify`: Spot-check of one collection
//!
//! # Example
//!
//! ```no_run
//! use docshift::{
//!     config::Config,
//!     connection::{ConnectionDescriptor, ConnectionManager},
//!     migrate::BulkCopier,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let manager = ConnectionManager::mongo(config.connection)
//!         .with_operation_timeout(std::time::Duration::from_secs(600));
//!
//!     let source = ConnectionDescriptor::new("mongodb://localhost:27017/shop", None);
//!     let target = ConnectionDescriptor::new("mongodb://backup:27017/shop", None);
//!
//!     let summary = BulkCopier::new(manager).migrate(&source, &target).await?;
//!     println!("{}", summary.summary_line());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod formatter;
pub mod inventory;
pub mod migrate;
pub mod store;
pub mod verify;

// Re-export commonly used types
pub use config::Config;
pub use connection::{ConnectionDescriptor, ConnectionManager};
pub use error::{DocshiftError, Result};
pub use formatter::Formatter;
pub use inventory::InventoryReporter;
pub use migrate::{BulkCopier, RunSummary};
pub use verify::{SpotCheckVerifier, VerificationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

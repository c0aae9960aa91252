//! Document store capability interface
//!
//! The migration engine only needs a handful of operations from a store:
//! list databases, list collections, count, read a whole collection, bulk
//! insert and fetch one document. [`DocumentStore`] captures exactly that,
//! and a [`StoreDriver`] turns a connection descriptor into a live store.
//!
//! Two drivers are provided:
//! - [`MongoDriver`]: MongoDB through the official driver
//! - [`MemoryDriver`]: in-process clusters keyed by URI, with MongoDB's
//!   ordered-insert and duplicate `_id` behavior

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::config::ConnectionConfig;
use crate::connection::ConnectionDescriptor;
use crate::error::Result;

pub mod memory;
pub mod mongo;

pub use memory::{MemoryCluster, MemoryDriver};
pub use mongo::MongoDriver;

/// Name and on-disk size of one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub size_bytes: u64,
}

/// Operations a document store must support
///
/// All methods are scoped by database name; a store instance corresponds to
/// one client session against one deployment.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Round-trip to confirm the deployment is reachable and authorized
    async fn ping(&self) -> Result<()>;

    /// List databases visible to this session
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// List collection names in a database, in store order
    async fn list_collections(&self, database: &str) -> Result<Vec<String>>;

    /// Count documents in a collection
    async fn count_documents(&self, database: &str, collection: &str) -> Result<u64>;

    /// Read every document of a collection into memory
    async fn read_all(&self, database: &str, collection: &str) -> Result<Vec<Document>>;

    /// Ordered bulk insert; returns the number of inserted documents
    ///
    /// When a document is rejected the error is a `DocshiftError::Write`
    /// carrying how many documents were written before it. Other failures
    /// leave the written prefix unknown.
    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64>;

    /// First document the store returns for a collection, if any
    async fn find_one(&self, database: &str, collection: &str) -> Result<Option<Document>>;

    /// Release the underlying session
    async fn shutdown(&self) -> Result<()>;
}

/// Opens a [`DocumentStore`] for a descriptor
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// URI schemes this driver can open, including the `://`
    fn schemes(&self) -> &'static [&'static str];

    /// Create a store session. Implementations need not contact the server;
    /// the connection manager pings right after.
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn DocumentStore>>;
}

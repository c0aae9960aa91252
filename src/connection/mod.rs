//! Connection management for document stores
//!
//! This module provides:
//! - `ConnectionDescriptor`: where to connect (URI + optional database)
//! - `ConnectionManager`: opens connections through a [`StoreDriver`]
//!   with a bounded connect + ping handshake
//! - `Connection`: a live, role-labelled handle whose store calls are
//!   bounded by the operation timeout and which must be closed explicitly

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::Document;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, validate_uri_scheme};
use crate::error::{ConfigError, ConnectionError, DocshiftError, EnumerationError, Result};
use crate::store::{DatabaseInfo, DocumentStore, MongoDriver, StoreDriver};

/// Default bound on a single read, count or insert
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Extract database name from a connection URI
///
/// Format: `scheme://[username:password@]host[:port][/database][?options]`
///
/// # Arguments
/// * `uri` - Connection URI
///
/// # Returns
/// * `Option<String>` - Database name if found in URI
pub fn extract_database_from_uri(uri: &str) -> Option<String> {
    if let Some(after_scheme) = uri.split("://").nth(1) {
        if let Some(path_part) = after_scheme.split('/').nth(1) {
            let db_name = path_part.split('?').next().unwrap_or("");
            if !db_name.is_empty() {
                return Some(db_name.to_string());
            }
        }
    }
    None
}

/// Hide credentials in a URI
///
/// Everything between `://` and `@` is replaced by `***`.
pub fn sanitize_uri(uri: &str) -> String {
    if let Some(proto_end) = uri.find("://") {
        if let Some(host_start) = uri.rfind('@') {
            if host_start > proto_end {
                let proto = &uri[..proto_end + 3];
                let host = &uri[host_start..];
                return format!("{}***{}", proto, host);
            }
        }
    }
    if uri.contains('@') {
        "mongodb://***".to_string()
    } else {
        uri.to_string()
    }
}

/// Where to connect: URI plus an optional database name
///
/// Immutable once built. When no database is given the one encoded in the
/// URI path is used.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    uri: String,
    database: Option<String>,
}

impl ConnectionDescriptor {
    pub fn new(uri: impl Into<String>, database: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            database,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Database given explicitly, else the one in the URI path
    pub fn database(&self) -> Option<String> {
        self.database
            .clone()
            .or_else(|| extract_database_from_uri(&self.uri))
    }

    /// URI with credentials masked, safe for logs
    pub fn sanitized_uri(&self) -> String {
        sanitize_uri(&self.uri)
    }
}

// Never print credentials, not even in debug output
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("uri", &self.sanitized_uri())
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{} (database {})", self.sanitized_uri(), db),
            None => write!(f, "{}", self.sanitized_uri()),
        }
    }
}

/// A collection discovered at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    pub name: String,
}

/// Opens connections through a store driver
#[derive(Clone)]
pub struct ConnectionManager {
    /// Driver used to create store sessions
    driver: Arc<dyn StoreDriver>,

    /// Connection configuration
    config: ConnectionConfig,

    /// Bound on each store call made through an opened connection
    operation_timeout: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Arguments
    /// * `driver` - Store driver
    /// * `config` - Connection configuration
    pub fn new(driver: Arc<dyn StoreDriver>, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Connection manager backed by the MongoDB driver
    pub fn mongo(config: ConnectionConfig) -> Self {
        Self::new(Arc::new(MongoDriver::new()), config)
    }

    /// Set the bound on each read, count and insert
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Open a connection and confirm it is usable
    ///
    /// The URI must use a scheme the driver understands. The connect and the
    /// ping run against one deadline of `connection.timeout` seconds. If the
    /// ping fails the half-open session is shut down before the error is
    /// returned, so callers only ever see fully usable connections.
    ///
    /// # Arguments
    /// * `role` - Label used in logs and errors (`source`, `target`)
    /// * `descriptor` - Where to connect
    ///
    /// # Returns
    /// * `Result<Connection>` - Open connection or a `ConnectionError`
    pub async fn open(&self, role: &str, descriptor: &ConnectionDescriptor) -> Result<Connection> {
        if validate_uri_scheme(role, descriptor.uri(), self.driver.schemes()).is_err() {
            return Err(ConnectionError::InvalidUri(descriptor.sanitized_uri()).into());
        }

        info!("Connecting to {} at {}", role, descriptor.sanitized_uri());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.timeout);

        let store = match tokio::time::timeout_at(
            deadline,
            self.driver.connect(descriptor, &self.config),
        )
        .await
        {
            Ok(Ok(store)) => store,
            Ok(Err(e)) => {
                return Err(ConnectionError::ConnectionFailed {
                    role: role.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    role: role.to_string(),
                    seconds: self.config.timeout,
                }
                .into());
            }
        };

        let ping_error = match tokio::time::timeout_at(deadline, store.ping()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(ConnectionError::PingFailed {
                role: role.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Some(ConnectionError::Timeout {
                role: role.to_string(),
                seconds: self.config.timeout,
            }),
        };

        if let Some(err) = ping_error {
            if let Err(e) = store.shutdown().await {
                warn!("Failed to release {} session after ping failure: {}", role, e);
            }
            return Err(err.into());
        }

        debug!("Connected to {}", role);
        Ok(Connection {
            role: role.to_string(),
            database: descriptor.database(),
            descriptor: descriptor.clone(),
            store: Some(store),
            operation_timeout: self.operation_timeout,
        })
    }
}

/// An open connection bound to one descriptor and one role
///
/// Must be closed with [`Connection::close`]; closing twice is a no-op.
pub struct Connection {
    role: String,
    database: Option<String>,
    descriptor: ConnectionDescriptor,
    store: Option<Box<dyn DocumentStore>>,
    operation_timeout: Duration,
}

impl Connection {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Database this connection works in, if one was configured
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Database this connection works in, or a configuration error
    pub fn require_database(&self) -> Result<&str> {
        self.database().ok_or_else(|| {
            ConfigError::MissingField(format!(
                "{role} database (pass --{role}-db or add /<database> to the URI)",
                role = self.role
            ))
            .into()
        })
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&dyn DocumentStore> {
        self.store
            .as_deref()
            .ok_or_else(|| ConnectionError::NotConnected(self.role.clone()).into())
    }

    fn enumeration_error(&self, what: &str, err: DocshiftError) -> DocshiftError {
        EnumerationError {
            role: self.role.clone(),
            what: what.to_string(),
            message: err.to_string(),
        }
        .into()
    }

    /// Run one store call under the operation timeout
    async fn bounded<T>(
        &self,
        operation: impl FnOnce() -> String,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DocshiftError::OperationTimeout {
                operation: operation(),
                timeout: self.operation_timeout,
            }),
        }
    }

    /// List databases with their on-disk size
    pub async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let store = self.store()?;
        self.bounded(|| "list databases".to_string(), store.list_databases())
            .await
            .map_err(|e| self.enumeration_error("databases", e))
    }

    /// List collections of this connection's database
    pub async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>> {
        let database = self.require_database()?.to_string();
        self.list_collections_in(&database).await
    }

    /// List collections of an arbitrary database, in store order
    pub async fn list_collections_in(&self, database: &str) -> Result<Vec<CollectionDescriptor>> {
        let store = self.store()?;
        let names = self
            .bounded(
                || format!("list collections in {database}"),
                store.list_collections(database),
            )
            .await
            .map_err(|e| self.enumeration_error("collections", e))?;
        Ok(names
            .into_iter()
            .map(|name| CollectionDescriptor { name })
            .collect())
    }

    /// Count documents in a collection of the given database
    pub async fn count_documents_in(&self, database: &str, collection: &str) -> Result<u64> {
        let store = self.store()?;
        self.bounded(
            || format!("count {collection}"),
            store.count_documents(database, collection),
        )
        .await
    }

    /// Count documents in a collection of this connection's database
    pub async fn count_documents(&self, collection: &str) -> Result<u64> {
        let database = self.require_database()?;
        self.count_documents_in(database, collection).await
    }

    /// Read a whole collection into memory
    pub async fn read_all(&self, collection: &str) -> Result<Vec<Document>> {
        let database = self.require_database()?;
        let store = self.store()?;
        self.bounded(
            || format!("read {collection}"),
            store.read_all(database, collection),
        )
        .await
    }

    /// Ordered bulk insert into a collection, exact name
    pub async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        let database = self.require_database()?;
        let store = self.store()?;
        self.bounded(
            || format!("insert into {collection}"),
            store.insert_many(database, collection, documents),
        )
        .await
    }

    /// First document the store returns for a collection
    pub async fn find_one(&self, collection: &str) -> Result<Option<Document>> {
        let database = self.require_database()?;
        let store = self.store()?;
        self.bounded(
            || format!("sample {collection}"),
            store.find_one(database, collection),
        )
        .await
    }

    /// Release the session
    ///
    /// Idempotent. Failures are logged, never returned; the return value
    /// only tells whether the release was clean.
    pub async fn close(&mut self) -> bool {
        let Some(store) = self.store.take() else {
            return true;
        };
        match store.shutdown().await {
            Ok(()) => {
                debug!("Closed connection to {}", self.role);
                true
            }
            Err(e) => {
                warn!("Failed to close connection to {}: {}", self.role, e);
                false
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.store.is_some() {
            warn!("Connection to {} dropped without close", self.role);
        }
    }
}

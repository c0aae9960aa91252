//! In-process document store
//!
//! Clusters live in memory and are registered with a [`MemoryDriver`] under
//! a `memory://` URI. Collections keep insertion order, inserts are ordered
//! and stop at the first duplicate `_id`, and missing `_id` values are
//! generated the way the MongoDB driver does. The cluster also records how
//! many insert calls and sessions it has seen, which the test suite uses to
//! assert on side effects.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, oid::ObjectId};

use super::{DatabaseInfo, DocumentStore, StoreDriver};
use crate::config::ConnectionConfig;
use crate::connection::ConnectionDescriptor;
use crate::error::{ConnectionError, ReadError, Result, WriteError};

/// Shared handle to one in-memory deployment
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

#[derive(Default)]
struct ClusterState {
    databases: Vec<MemoryDatabase>,
    insert_attempts: u64,
    sessions_opened: u64,
    sessions_closed: u64,
    failing_reads: HashSet<String>,
    read_delays: HashMap<String, Duration>,
    interrupted_inserts: HashMap<String, usize>,
    handshake_delay: Option<Duration>,
    reject_ping: bool,
    fail_listing: bool,
    fail_shutdown: bool,
}

struct MemoryDatabase {
    name: String,
    collections: Vec<(String, Vec<Document>)>,
}

impl ClusterState {
    fn database(&self, name: &str) -> Option<&MemoryDatabase> {
        self.databases.iter().find(|db| db.name == name)
    }

    fn collection(&self, database: &str, collection: &str) -> Option<&Vec<Document>> {
        self.database(database)?
            .collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, docs)| docs)
    }

    fn collection_mut(&mut self, database: &str, collection: &str) -> &mut Vec<Document> {
        let db_index = match self.databases.iter().position(|db| db.name == database) {
            Some(i) => i,
            None => {
                self.databases.push(MemoryDatabase {
                    name: database.to_string(),
                    collections: Vec::new(),
                });
                self.databases.len() - 1
            }
        };
        let db = &mut self.databases[db_index];
        let coll_index = match db.collections.iter().position(|(n, _)| n == collection) {
            Some(i) => i,
            None => {
                db.collections.push((collection.to_string(), Vec::new()));
                db.collections.len() - 1
            }
        };
        &mut db.collections[coll_index].1
    }
}

impl MemoryCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder form of [`MemoryCluster::put_collection`]
    pub fn with_collection(self, database: &str, collection: &str, docs: Vec<Document>) -> Self {
        self.put_collection(database, collection, docs);
        self
    }

    /// Create or replace a collection with the given documents
    pub fn put_collection(&self, database: &str, collection: &str, docs: Vec<Document>) {
        *self.state().collection_mut(database, collection) = docs;
    }

    /// Snapshot of a collection's documents (empty if it does not exist)
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state()
            .collection(database, collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Collection names of a database in creation order
    pub fn collection_names(&self, database: &str) -> Vec<String> {
        self.state()
            .database(database)
            .map(|db| db.collections.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of bulk insert calls received so far
    pub fn insert_attempts(&self) -> u64 {
        self.state().insert_attempts
    }

    /// Sessions opened and not yet shut down
    pub fn open_sessions(&self) -> u64 {
        let state = self.state();
        state.sessions_opened - state.sessions_closed
    }

    /// Total sessions ever opened
    pub fn sessions_opened(&self) -> u64 {
        self.state().sessions_opened
    }

    /// Make every read of `collection` fail
    pub fn fail_reads_on(&self, collection: &str) {
        self.state().failing_reads.insert(collection.to_string());
    }

    /// Delay every read of `collection`
    pub fn delay_reads_on(&self, collection: &str, delay: Duration) {
        self.state()
            .read_delays
            .insert(collection.to_string(), delay);
    }

    /// Make the liveness check fail, as an auth failure would
    pub fn reject_ping(&self) {
        self.state().reject_ping = true;
    }

    /// Delay both session creation and the liveness check
    pub fn delay_handshake(&self, delay: Duration) {
        self.state().handshake_delay = Some(delay);
    }

    /// Drop the connection after `after` documents of a bulk insert into
    /// `collection` were written, without reporting how many made it
    pub fn interrupt_inserts_on(&self, collection: &str, after: usize) {
        self.state()
            .interrupted_inserts
            .insert(collection.to_string(), after);
    }

    /// Make collection listing fail, as a missing `listCollections` grant would
    pub fn fail_listing(&self) {
        self.state().fail_listing = true;
    }

    /// Make session shutdown fail; the session stays counted as open
    pub fn fail_shutdown(&self) {
        self.state().fail_shutdown = true;
    }

    fn handshake_delay(&self) -> Option<Duration> {
        self.state().handshake_delay
    }
}

/// Driver resolving `memory://` URIs to registered clusters
#[derive(Clone, Default)]
pub struct MemoryDriver {
    clusters: Arc<Mutex<HashMap<String, MemoryCluster>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster under a URI
    pub fn register(&self, uri: &str, cluster: MemoryCluster) {
        self.clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), cluster);
    }

    /// Builder form of [`MemoryDriver::register`]
    pub fn with_cluster(self, uri: &str, cluster: MemoryCluster) -> Self {
        self.register(uri, cluster);
        self
    }
}

/// Strip the database path and options so `memory://a/shop?x=1` resolves
/// to the cluster registered as `memory://a`
fn cluster_key(uri: &str) -> &str {
    let Some(scheme_end) = uri.find("://") else {
        return uri;
    };
    let rest = &uri[scheme_end + 3..];
    match rest.find(['/', '?']) {
        Some(end) => &uri[..scheme_end + 3 + end],
        None => uri,
    }
}

#[async_trait]
impl StoreDriver for MemoryDriver {
    fn schemes(&self) -> &'static [&'static str] {
        &["memory://"]
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn DocumentStore>> {
        let key = cluster_key(descriptor.uri());
        let cluster = self
            .clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| ConnectionError::ConnectionFailed {
                role: key.to_string(),
                message: "no such host".to_string(),
            })?;

        if let Some(delay) = cluster.handshake_delay() {
            tokio::time::sleep(delay).await;
        }

        cluster.state().sessions_opened += 1;
        Ok(Box::new(MemoryStore { cluster }))
    }
}

/// One session against a [`MemoryCluster`]
pub struct MemoryStore {
    cluster: MemoryCluster,
}

impl MemoryStore {
    async fn before_read(&self, collection: &str) -> Result<()> {
        let (fails, delay) = {
            let state = self.cluster.state();
            (
                state.failing_reads.contains(collection),
                state.read_delays.get(collection).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fails {
            return Err(ReadError {
                collection: collection.to_string(),
                message: "cursor killed".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        if let Some(delay) = self.cluster.handshake_delay() {
            tokio::time::sleep(delay).await;
        }
        if self.cluster.state().reject_ping {
            return Err("Authentication failed".into());
        }
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let state = self.cluster.state();
        Ok(state
            .databases
            .iter()
            .map(|db| DatabaseInfo {
                name: db.name.clone(),
                size_bytes: db
                    .collections
                    .iter()
                    .flat_map(|(_, docs)| docs.iter())
                    .map(|doc| mongodb::bson::to_vec(doc).map(|b| b.len() as u64).unwrap_or(0))
                    .sum(),
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        if self.cluster.state().fail_listing {
            return Err(format!(
                "not authorized on {database} to execute command listCollections"
            )
            .into());
        }
        Ok(self.cluster.collection_names(database))
    }

    async fn count_documents(&self, database: &str, collection: &str) -> Result<u64> {
        self.before_read(collection).await?;
        Ok(self
            .cluster
            .state()
            .collection(database, collection)
            .map_or(0, |docs| docs.len() as u64))
    }

    async fn read_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        self.before_read(collection).await?;
        Ok(self.cluster.documents(database, collection))
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64> {
        let mut state = self.cluster.state();
        state.insert_attempts += 1;

        let interrupt_after = state.interrupted_inserts.get(collection).copied();
        let target = state.collection_mut(database, collection);
        let mut inserted = 0u64;

        for (position, mut doc) in documents.into_iter().enumerate() {
            if interrupt_after == Some(position) {
                return Err("connection reset by peer".into());
            }

            let id = match doc.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Bson::ObjectId(ObjectId::new());
                    let mut with_id = Document::new();
                    with_id.insert("_id", id.clone());
                    with_id.extend(doc);
                    doc = with_id;
                    id
                }
            };

            if target.iter().any(|existing| existing.get("_id") == Some(&id)) {
                return Err(WriteError {
                    collection: collection.to_string(),
                    inserted: Some(inserted),
                    message: format!(
                        "DuplicateKey (11000): E11000 duplicate key error collection: \
                         {database}.{collection} index: _id_ dup key: {{ _id: {id} }}"
                    ),
                }
                .into());
            }

            target.push(doc);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn find_one(&self, database: &str, collection: &str) -> Result<Option<Document>> {
        self.before_read(collection).await?;
        Ok(self
            .cluster
            .state()
            .collection(database, collection)
            .and_then(|docs| docs.first().cloned()))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut state = self.cluster.state();
        if state.fail_shutdown {
            return Err("endSessions failed: host unreachable".into());
        }
        state.sessions_closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocshiftError;
    use mongodb::bson::doc;

    async fn open(driver: &MemoryDriver, uri: &str) -> Box<dyn DocumentStore> {
        driver
            .connect(
                &ConnectionDescriptor::new(uri, None),
                &ConnectionConfig::default(),
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_cluster_key() {
        assert_eq!(cluster_key("memory://a"), "memory://a");
        assert_eq!(cluster_key("memory://a/shop"), "memory://a");
        assert_eq!(cluster_key("memory://a?x=1"), "memory://a");
        assert_eq!(cluster_key("plain"), "plain");
    }

    #[tokio::test]
    async fn test_unknown_uri_fails() {
        let driver = MemoryDriver::new();
        let result = driver
            .connect(
                &ConnectionDescriptor::new("memory://nowhere", None),
                &ConnectionConfig::default(),
            )
            .await;
        assert!(matches!(result, Err(DocshiftError::Connection(_))));
    }

    #[tokio::test]
    async fn test_insert_preserves_order_and_ids() {
        let cluster = MemoryCluster::new();
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster.clone());
        let store = open(&driver, "memory://t").await;

        let inserted = store
            .insert_many(
                "shop",
                "users",
                vec![doc! { "_id": 2, "n": "b" }, doc! { "_id": 1, "n": "a" }],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let docs = cluster.documents("shop", "users");
        assert_eq!(docs[0].get_i32("_id").unwrap(), 2);
        assert_eq!(docs[1].get_i32("_id").unwrap(), 1);
        assert_eq!(cluster.insert_attempts(), 1);
    }

    #[tokio::test]
    async fn test_insert_generates_missing_id_first() {
        let cluster = MemoryCluster::new();
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster.clone());
        let store = open(&driver, "memory://t").await;

        store
            .insert_many("shop", "logs", vec![doc! { "msg": "hi" }])
            .await
            .unwrap();
        let doc = &cluster.documents("shop", "logs")[0];
        assert_eq!(doc.keys().next().map(String::as_str), Some("_id"));
        assert!(doc.get_object_id("_id").is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_stops_ordered_insert() {
        let cluster =
            MemoryCluster::new().with_collection("shop", "users", vec![doc! { "_id": 3 }]);
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster.clone());
        let store = open(&driver, "memory://t").await;

        let err = store
            .insert_many(
                "shop",
                "users",
                vec![doc! { "_id": 1 }, doc! { "_id": 3 }, doc! { "_id": 4 }],
            )
            .await
            .unwrap_err();

        match err {
            DocshiftError::Write(write) => {
                assert_eq!(write.inserted, Some(1));
                assert!(write.message.contains("DuplicateKey"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cluster.documents("shop", "users").len(), 2);
    }

    #[tokio::test]
    async fn test_sessions_are_counted() {
        let cluster = MemoryCluster::new();
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster.clone());
        let store = open(&driver, "memory://t/shop").await;
        assert_eq!(cluster.open_sessions(), 1);
        store.shutdown().await.unwrap();
        assert_eq!(cluster.open_sessions(), 0);
        assert_eq!(cluster.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_failing_reads() {
        let cluster = MemoryCluster::new().with_collection("shop", "bad", vec![doc! { "_id": 1 }]);
        cluster.fail_reads_on("bad");
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster);
        let store = open(&driver, "memory://t").await;
        assert!(store.read_all("shop", "bad").await.is_err());
        assert!(store.count_documents("shop", "bad").await.is_err());
    }

    #[tokio::test]
    async fn test_interrupted_insert_keeps_written_prefix() {
        let cluster = MemoryCluster::new();
        cluster.interrupt_inserts_on("users", 2);
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster.clone());
        let store = open(&driver, "memory://t").await;

        let err = store
            .insert_many(
                "shop",
                "users",
                vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 3 }],
            )
            .await
            .unwrap_err();
        assert!(!matches!(err, DocshiftError::Write(_)));
        assert_eq!(cluster.documents("shop", "users").len(), 2);
    }

    #[tokio::test]
    async fn test_listing_and_shutdown_failures() {
        let cluster = MemoryCluster::new().with_collection("shop", "users", vec![]);
        cluster.fail_listing();
        cluster.fail_shutdown();
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster.clone());
        let store = open(&driver, "memory://t").await;

        assert!(store.list_collections("shop").await.is_err());
        assert!(store.shutdown().await.is_err());
        assert_eq!(cluster.open_sessions(), 1);
    }

    #[tokio::test]
    async fn test_list_databases_reports_sizes() {
        let cluster = MemoryCluster::new()
            .with_collection("shop", "users", vec![doc! { "_id": 1, "name": "ann" }])
            .with_collection("empty", "nothing", vec![]);
        let driver = MemoryDriver::new().with_cluster("memory://t", cluster);
        let store = open(&driver, "memory://t").await;

        let dbs = store.list_databases().await.unwrap();
        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs[0].name, "shop");
        assert!(dbs[0].size_bytes > 0);
        assert_eq!(dbs[1].size_bytes, 0);
    }
}

//! Pre-flight discovery of databases and collections
//!
//! Each endpoint is inspected under its own connection and its own error
//! boundary: an unreachable target still leaves a complete source
//! inventory, and a collection whose count fails only marks that line.

use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionDescriptor, ConnectionManager};
use crate::error::Result;

/// Shown in place of an endpoint whose configuration could not be resolved
const UNRESOLVED_ENDPOINT: &str = "<unresolved>";

/// Databases hidden unless explicitly requested
const SYSTEM_DATABASES: &[&str] = &["admin", "local", "config"];

/// Document count of one collection, or why it could not be counted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStat {
    pub name: String,
    pub document_count: Option<u64>,
    pub error: Option<String>,
}

/// Collections of one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInventory {
    pub name: String,
    /// Unknown when the session may not list databases
    pub size_bytes: Option<u64>,
    pub collections: Vec<CollectionStat>,
}

impl DatabaseInventory {
    pub fn total_documents(&self) -> u64 {
        self.collections
            .iter()
            .filter_map(|c| c.document_count)
            .sum()
    }
}

/// Inventory of one endpoint
#[derive(Debug)]
pub struct InventoryReport {
    /// Operator label (`source`, `target`)
    pub label: String,
    /// Endpoint with credentials masked
    pub endpoint: String,
    pub result: Result<Vec<DatabaseInventory>>,
}

impl InventoryReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Lists databases, collections and document counts
pub struct InventoryReporter {
    manager: ConnectionManager,
    include_system_databases: bool,
}

impl InventoryReporter {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            include_system_databases: false,
        }
    }

    /// Include `admin`, `local` and `config` when listing all databases
    pub fn with_system_databases(mut self, include: bool) -> Self {
        self.include_system_databases = include;
        self
    }

    /// Inspect several endpoints, one at a time
    ///
    /// An endpoint that could not be resolved from the configuration gets a
    /// failed report of its own; the others are still inspected.
    ///
    /// # Arguments
    /// * `endpoints` - Labelled descriptors, or why a label has none
    ///
    /// # Returns
    /// * `Vec<InventoryReport>` - One report per endpoint, failures included
    pub async fn inspect_all(
        &self,
        endpoints: Vec<(String, Result<ConnectionDescriptor>)>,
    ) -> Vec<InventoryReport> {
        let mut reports = Vec::with_capacity(endpoints.len());
        for (label, descriptor) in endpoints {
            let report = match descriptor {
                Ok(descriptor) => self.inspect(&label, &descriptor).await,
                Err(e) => {
                    warn!("Cannot resolve {} endpoint: {}", label, e);
                    InventoryReport {
                        label,
                        endpoint: UNRESOLVED_ENDPOINT.to_string(),
                        result: Err(e),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }

    /// Inspect one endpoint under its own connection
    pub async fn inspect(&self, label: &str, descriptor: &ConnectionDescriptor) -> InventoryReport {
        info!("Inspecting {} ({})", label, descriptor.sanitized_uri());

        let result = match self.manager.open(label, descriptor).await {
            Ok(mut conn) => {
                let result = self.collect(&conn).await;
                conn.close().await;
                result
            }
            Err(e) => Err(e),
        };

        InventoryReport {
            label: label.to_string(),
            endpoint: descriptor.sanitized_uri(),
            result,
        }
    }

    async fn collect(&self, conn: &Connection) -> Result<Vec<DatabaseInventory>> {
        if let Some(database) = conn.database() {
            // Restricted users often may not list databases; size is optional
            let size_bytes = match conn.list_databases().await {
                Ok(dbs) => dbs
                    .into_iter()
                    .find(|db| db.name == database)
                    .map(|db| db.size_bytes),
                Err(e) => {
                    debug!("Cannot list databases on {}: {}", conn.role(), e);
                    None
                }
            };
            let collections = self.collection_stats(conn, database).await?;
            return Ok(vec![DatabaseInventory {
                name: database.to_string(),
                size_bytes,
                collections,
            }]);
        }

        let mut inventory = Vec::new();
        for db in conn.list_databases().await? {
            if !self.include_system_databases && SYSTEM_DATABASES.contains(&db.name.as_str()) {
                continue;
            }
            let collections = self.collection_stats(conn, &db.name).await?;
            inventory.push(DatabaseInventory {
                name: db.name,
                size_bytes: Some(db.size_bytes),
                collections,
            });
        }
        Ok(inventory)
    }

    async fn collection_stats(&self, conn: &Connection, database: &str) -> Result<Vec<CollectionStat>> {
        let collections = conn.list_collections_in(database).await?;
        let mut stats = Vec::with_capacity(collections.len());

        for collection in collections {
            let stat = match conn.count_documents_in(database, &collection.name).await {
                Ok(count) => CollectionStat {
                    name: collection.name,
                    document_count: Some(count),
                    error: None,
                },
                Err(e) => CollectionStat {
                    name: collection.name,
                    document_count: None,
                    error: Some(e.to_string()),
                },
            };
            stats.push(stat);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mongodb::bson::doc;

    use crate::config::ConnectionConfig;
    use crate::error::ConfigError;
    use crate::store::{MemoryCluster, MemoryDriver};

    fn reporter(driver: MemoryDriver) -> InventoryReporter {
        InventoryReporter::new(ConnectionManager::new(
            Arc::new(driver),
            ConnectionConfig::default(),
        ))
    }

    fn cluster() -> MemoryCluster {
        MemoryCluster::new()
            .with_collection("shop", "users", vec![doc! { "_id": 1 }, doc! { "_id": 2 }])
            .with_collection("shop", "orders", vec![doc! { "_id": 1 }])
            .with_collection("blog", "posts", vec![])
            .with_collection("admin", "system.users", vec![doc! { "_id": "root" }])
    }

    #[tokio::test]
    async fn test_single_database() {
        let reporter = reporter(MemoryDriver::new().with_cluster("memory://a", cluster()));
        let report = reporter
            .inspect("source", &ConnectionDescriptor::new("memory://a/shop", None))
            .await;

        let dbs = report.result.unwrap();
        assert_eq!(dbs.len(), 1);
        assert_eq!(dbs[0].name, "shop");
        assert!(dbs[0].size_bytes.unwrap() > 0);
        assert_eq!(dbs[0].total_documents(), 3);
        assert_eq!(dbs[0].collections[0].name, "users");
        assert_eq!(dbs[0].collections[0].document_count, Some(2));
    }

    #[tokio::test]
    async fn test_all_databases_skip_system() {
        let reporter = reporter(MemoryDriver::new().with_cluster("memory://a", cluster()));
        let report = reporter
            .inspect("source", &ConnectionDescriptor::new("memory://a", None))
            .await;

        let names: Vec<_> = report
            .result
            .unwrap()
            .into_iter()
            .map(|db| db.name)
            .collect();
        assert_eq!(names, vec!["shop", "blog"]);
    }

    #[tokio::test]
    async fn test_all_databases_with_system() {
        let reporter = reporter(MemoryDriver::new().with_cluster("memory://a", cluster()))
            .with_system_databases(true);
        let report = reporter
            .inspect("source", &ConnectionDescriptor::new("memory://a", None))
            .await;
        assert_eq!(report.result.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_on_one_endpoint_does_not_stop_the_other() {
        let source = cluster();
        let reporter = reporter(MemoryDriver::new().with_cluster("memory://a", source.clone()));
        let endpoints = vec![
            (
                "target".to_string(),
                Ok(ConnectionDescriptor::new("memory://down/shop", None)),
            ),
            (
                "source".to_string(),
                Ok(ConnectionDescriptor::new("memory://a/shop", None)),
            ),
        ];

        let reports = reporter.inspect_all(endpoints).await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].is_success());
        assert!(reports[0].result.as_ref().unwrap_err().to_string().contains("target"));
        assert!(reports[1].is_success());
        assert_eq!(source.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_endpoint_does_not_stop_the_other() {
        let target = cluster();
        let reporter = reporter(MemoryDriver::new().with_cluster("memory://a", target.clone()));
        let unresolved: Result<ConnectionDescriptor> = Err(ConfigError::UnknownDatasource {
            name: "qa".to_string(),
            available: Vec::new(),
        }
        .into());
        let endpoints = vec![
            ("source".to_string(), unresolved),
            (
                "target".to_string(),
                Ok(ConnectionDescriptor::new("memory://a/shop", None)),
            ),
        ];

        let reports = reporter.inspect_all(endpoints).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].label, "source");
        assert_eq!(reports[0].endpoint, "<unresolved>");
        assert!(reports[0].result.as_ref().unwrap_err().to_string().contains("qa"));
        assert!(reports[1].is_success());
        assert_eq!(target.sessions_opened(), 1);
        assert_eq!(target.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_count_failure_marks_only_that_collection() {
        let source = cluster();
        source.fail_reads_on("orders");
        let reporter = reporter(MemoryDriver::new().with_cluster("memory://a", source));
        let report = reporter
            .inspect("source", &ConnectionDescriptor::new("memory://a/shop", None))
            .await;

        let dbs = report.result.unwrap();
        let orders = dbs[0].collections.iter().find(|c| c.name == "orders").unwrap();
        assert_eq!(orders.document_count, None);
        assert!(orders.error.is_some());
        assert_eq!(dbs[0].collections[0].document_count, Some(2));
    }

    #[tokio::test]
    async fn test_masks_credentials_in_endpoint() {
        let reporter = reporter(MemoryDriver::new());
        let report = reporter
            .inspect(
                "source",
                &ConnectionDescriptor::new("memory://user:pw@host/shop", None),
            )
            .await;
        assert!(!report.endpoint.contains("pw"));
    }
}

//! MongoDB-backed document store

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::{Client, Collection, options::ClientOptions};
use tracing::debug;

use super::{DatabaseInfo, DocumentStore, StoreDriver};
use crate::config::ConnectionConfig;
use crate::connection::ConnectionDescriptor;
use crate::error::mongo::{extract_error_info, write_error_from_insert};
use crate::error::{ReadError, Result};

/// Driver that opens [`MongoStore`] sessions
#[derive(Debug, Default, Clone)]
pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }

    /// Configure client options from connection settings
    ///
    /// Server selection is bounded by the same timeout as the TCP connect,
    /// so an unreachable host fails the ping instead of hanging.
    fn configure(mut options: ClientOptions, config: &ConnectionConfig) -> ClientOptions {
        let timeout = Duration::from_secs(config.timeout);
        options.app_name = Some(config.app_name.clone());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options
    }
}

#[async_trait]
impl StoreDriver for MongoDriver {
    fn schemes(&self) -> &'static [&'static str] {
        crate::config::MONGODB_SCHEMES
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn DocumentStore>> {
        let options = ClientOptions::parse(descriptor.uri()).await?;
        let client = Client::with_options(Self::configure(options, config))?;
        Ok(Box::new(MongoStore { client }))
    }
}

/// One MongoDB client session
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.client.database(database).collection(collection)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let specs = self.client.list_databases().await?;
        Ok(specs
            .into_iter()
            .map(|db| DatabaseInfo {
                name: db.name,
                size_bytes: db.size_on_disk,
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn count_documents(&self, database: &str, collection: &str) -> Result<u64> {
        Ok(self
            .collection(database, collection)
            .count_documents(doc! {})
            .await?)
    }

    async fn read_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let to_read_error = |e: mongodb::error::Error| ReadError {
            collection: collection.to_string(),
            message: extract_error_info(&e).summary(),
        };

        let cursor = self
            .collection(database, collection)
            .find(doc! {})
            .await
            .map_err(to_read_error)?;
        let docs: Vec<Document> = cursor.try_collect().await.map_err(to_read_error)?;

        debug!("Read {} documents from {}.{}", docs.len(), database, collection);
        Ok(docs)
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64> {
        let result = self
            .collection(database, collection)
            .insert_many(documents)
            .await
            .map_err(|e| write_error_from_insert(collection, &e))?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn find_one(&self, database: &str, collection: &str) -> Result<Option<Document>> {
        Ok(self.collection(database, collection).find_one(doc! {}).await?)
    }

    async fn shutdown(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

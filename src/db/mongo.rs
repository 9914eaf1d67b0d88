//! MongoDB client and collection wrapper
//!
//! Every call is bounded by the client's operation timeout and surfaces as a
//! `Storage` error instead of hanging.

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::{DeleteResult, UpdateResult},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::future::IntoFuture;
use std::time::Duration;
use tracing::info;

use crate::types::{RelayError, Result};

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
    timeout: Duration,
}

impl MongoClient {
    /// Connect and verify the server is reachable
    pub async fn new(uri: &str, db_name: &str, timeout: Duration) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| RelayError::Storage(format!("Failed to connect to MongoDB: {}", e)))?;

        bounded(timeout, client.database(db_name).run_command(doc! { "ping": 1 }))
            .await
            .map_err(|e| RelayError::Storage(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
            timeout,
        })
    }

    /// Get a typed collection, creating its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name, self.timeout).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
    timeout: Duration,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection {
            inner: collection,
            timeout,
        };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        bounded(self.timeout, self.inner.create_indexes(indices))
            .await
            .map_err(|e| RelayError::Storage(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document
    pub async fn insert_one(&self, item: &T) -> Result<()> {
        bounded(self.timeout, self.inner.insert_one(item))
            .await
            .map_err(|e| RelayError::Storage(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    /// Insert a document unless its `_id` already exists
    ///
    /// Returns `false` on a duplicate key; any other failure is an error.
    pub async fn insert_unique(&self, item: &T) -> Result<bool> {
        match bounded(self.timeout, self.inner.insert_one(item)).await {
            Ok(_) => Ok(true),
            Err(BoundedError::Driver(e)) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(RelayError::Storage(format!("Insert failed: {}", e))),
        }
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        bounded(self.timeout, self.inner.find_one(filter))
            .await
            .map_err(|e| RelayError::Storage(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter, in `sort` order
    pub async fn find_many(&self, filter: Document, sort: Document) -> Result<Vec<T>> {
        let query = async {
            let cursor = self.inner.find(filter).sort(sort).await?;
            let items: Vec<T> = cursor.try_collect().await?;
            Ok::<_, mongodb::error::Error>(items)
        };

        bounded(self.timeout, query)
            .await
            .map_err(|e| RelayError::Storage(format!("Find failed: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult> {
        bounded(self.timeout, self.inner.update_one(filter, update.into()))
            .await
            .map_err(|e| RelayError::Storage(format!("Update failed: {}", e)))
    }

    /// Replace the document matching `filter`, inserting it if absent
    pub async fn upsert_one(&self, filter: Document, item: &T) -> Result<UpdateResult> {
        bounded(self.timeout, self.inner.replace_one(filter, item).upsert(true))
            .await
            .map_err(|e| RelayError::Storage(format!("Upsert failed: {}", e)))
    }

    /// Hard delete one document
    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult> {
        bounded(self.timeout, self.inner.delete_one(filter))
            .await
            .map_err(|e| RelayError::Storage(format!("Delete failed: {}", e)))
    }
}

/// Failure of a bounded driver call
#[derive(Debug, thiserror::Error)]
enum BoundedError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Driver(mongodb::error::Error),
}

async fn bounded<F, O>(timeout: Duration, fut: F) -> std::result::Result<O, BoundedError>
where
    F: IntoFuture<Output = mongodb::error::Result<O>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(BoundedError::Driver),
        Err(_) => Err(BoundedError::Timeout(timeout)),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

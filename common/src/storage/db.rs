use std::{ops::Deref, sync::Arc};

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

use super::types::StoredObject;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines the indexes the orchestrator relies on. The HNSW index is
    /// redefined with the embedding provider's dimension, so a dimension
    /// change at startup takes effect without a manual migration.
    pub async fn ensure_indexes(&self, embedding_dimension: usize) -> Result<(), Error> {
        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE idx_engine_chunk_embedding ON TABLE engine_chunk \
                 FIELDS embedding HNSW DIMENSION {embedding_dimension} DIST COSINE"
            ))
            .await?;
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_engine_chunk_engine ON TABLE engine_chunk \
                 FIELDS engine_id",
            )
            .await?;
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_claim_document_claim ON TABLE claim_document \
                 FIELDS claim_id",
            )
            .await?;
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_claim_document_arrival ON TABLE claim_document \
                 FIELDS created_at",
            )
            .await?;

        Ok(())
    }

    /// Stores an object in its table, keyed by the object's id.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

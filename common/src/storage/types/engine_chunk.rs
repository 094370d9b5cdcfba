use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(EngineChunk, "engine_chunk", {
    engine_id: String,
    claim_id: String,
    document_id: String,
    chunk_index: u32,
    text: String,
    embedding: Vec<f32>
});

/// A retrieved chunk together with its similarity score (1.0 is best).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: EngineChunk,
    pub score: f32,
}

impl EngineChunk {
    /// Deterministic record key so re-indexing a document upserts instead of
    /// duplicating rows.
    pub fn record_key(engine_id: &str, document_id: &str, chunk_index: u32) -> String {
        format!("{engine_id}:{document_id}:{chunk_index}")
    }

    pub fn new(
        engine_id: String,
        claim_id: String,
        document_id: String,
        chunk_index: u32,
        text: String,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            engine_id,
            claim_id,
            document_id,
            chunk_index,
            text,
            embedding,
        }
    }

    /// Nearest chunks to the query vector, scoped to one engine's index.
    /// Cosine distance from the HNSW index is mapped onto a 0..=1 score.
    pub async fn find_top_k(
        engine_id: &str,
        query_embedding: &[f32],
        k: u8,
        db: &SurrealDbClient,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        // serde(flatten) would buffer the row, and the buffered form breaks
        // the tolerant id and datetime deserializers; fields stay explicit.
        #[derive(Deserialize)]
        struct ChunkHit {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            #[serde(deserialize_with = "deserialize_datetime", default)]
            created_at: DateTime<Utc>,
            #[serde(deserialize_with = "deserialize_datetime", default)]
            updated_at: DateTime<Utc>,
            engine_id: String,
            claim_id: String,
            document_id: String,
            chunk_index: u32,
            text: String,
            embedding: Vec<f32>,
            distance: f32,
        }

        let query = format!(
            "SELECT *, vector::distance::knn() AS distance FROM {} \
             WHERE engine_id = '{}' AND embedding <|{},40|> {:?} \
             ORDER BY distance",
            Self::table_name(),
            engine_id,
            k,
            query_embedding
        );

        let hits: Vec<ChunkHit> = db.client.query(query).await?.take(0)?;

        Ok(hits
            .into_iter()
            .map(|hit| ScoredChunk {
                score: (1.0 - hit.distance).clamp(0.0, 1.0),
                chunk: EngineChunk {
                    id: hit.id,
                    created_at: hit.created_at,
                    updated_at: hit.updated_at,
                    engine_id: hit.engine_id,
                    claim_id: hit.claim_id,
                    document_id: hit.document_id,
                    chunk_index: hit.chunk_index,
                    text: hit.text,
                    embedding: hit.embedding,
                },
            })
            .collect())
    }

    /// Releases an engine's entire index as a unit. Deleting an unknown
    /// engine id is a no-op, which keeps expiry idempotent.
    pub async fn delete_by_engine_id(
        engine_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE type::table($table) WHERE engine_id = $engine_id")
            .bind(("table", Self::table_name()))
            .bind(("engine_id", engine_id.to_string()))
            .await?;

        Ok(())
    }

    pub async fn count_by_engine_id(
        engine_id: &str,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            total: usize,
        }

        let row: Option<CountRow> = db
            .client
            .query(
                "SELECT count() AS total FROM type::table($table)
                 WHERE engine_id = $engine_id
                 GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("engine_id", engine_id.to_string()))
            .await?
            .take(0)?;

        Ok(row.map_or(0, |r| r.total))
    }
}

use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use text_splitter::{Characters, ChunkConfig, TextSplitter};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{claim_document::ClaimDocument, engine_chunk::EngineChunk, StoredObject},
    },
    utils::embedding::EmbeddingProvider,
};

use crate::content::ContentAccess;

/// A document the pipeline could not index, with the reason kept for
/// operator triage and retry decisions.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedDocument {
    pub document_id: String,
    pub reason: String,
}

/// Outcome of one indexing pass. A single document failing never aborts the
/// rest; callers decide what a non-empty `failed` list means (a partial
/// engine, or a creation failure when nothing indexed at all).
#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub indexed: Vec<String>,
    pub failed: Vec<FailedDocument>,
    pub chunk_count: usize,
}

impl IndexOutcome {
    pub fn failure_fraction(&self) -> f32 {
        let total = self.indexed.len() + self.failed.len();
        if total == 0 {
            return 0.0;
        }
        self.failed.len() as f32 / total as f32
    }
}

pub struct IndexingPipeline {
    db: Arc<SurrealDbClient>,
    embedding: Arc<EmbeddingProvider>,
    content: Arc<dyn ContentAccess>,
    splitter: TextSplitter<Characters>,
}

impl IndexingPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        embedding: Arc<EmbeddingProvider>,
        content: Arc<dyn ContentAccess>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, AppError> {
        let chunk_config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|err| AppError::Validation(format!("chunking configuration: {err}")))?;

        Ok(Self {
            db,
            embedding,
            content,
            splitter: TextSplitter::new(chunk_config),
        })
    }

    /// Indexes every document not yet present in the engine's indexed set.
    /// Idempotent by document id: chunk rows use deterministic keys, so a
    /// repeated pass upserts rather than duplicates.
    pub async fn index_documents(
        &self,
        engine_id: &str,
        documents: &[ClaimDocument],
        already_indexed: &HashSet<String>,
    ) -> IndexOutcome {
        let mut outcome = IndexOutcome::default();

        for document in documents {
            if already_indexed.contains(&document.id) {
                continue;
            }

            match self.index_single(engine_id, document).await {
                Ok(chunk_count) => {
                    outcome.chunk_count += chunk_count;
                    outcome.indexed.push(document.id.clone());
                }
                Err(err) => {
                    warn!(
                        engine_id,
                        document_id = %document.id,
                        error = %err,
                        "document failed to index; continuing with remaining documents"
                    );
                    outcome.failed.push(FailedDocument {
                        document_id: document.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            engine_id,
            indexed = outcome.indexed.len(),
            failed = outcome.failed.len(),
            chunks = outcome.chunk_count,
            "indexing pass finished"
        );

        outcome
    }

    async fn index_single(
        &self,
        engine_id: &str,
        document: &ClaimDocument,
    ) -> Result<usize, AppError> {
        let text = self.content.fetch(document).await?;

        let chunks: Vec<String> = self
            .splitter
            .chunks(&text)
            .map(ToOwned::to_owned)
            .collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);
        let embeddings = Retry::spawn(retry_strategy, || {
            self.embedding.embed_batch(chunks.clone())
        })
        .await
        .map_err(|err| AppError::CapabilityUnavailable(format!("embedding: {err}")))?;

        let chunk_count = chunks.len();
        for (index, (chunk_text, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
            let index = u32::try_from(index)
                .map_err(|_| AppError::Validation("chunk index overflow".into()))?;
            let key = EngineChunk::record_key(engine_id, &document.id, index);
            let mut record = EngineChunk::new(
                engine_id.to_string(),
                document.claim_id.clone(),
                document.id.clone(),
                index,
                chunk_text,
                embedding,
            );
            record.id = key.clone();

            let _: Option<EngineChunk> = self
                .db
                .client
                .upsert((EngineChunk::table_name(), key))
                .content(record)
                .await?;
        }

        Ok(chunk_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StaticContent;
    use common::storage::types::claim_document::DocumentType;
    use uuid::Uuid;

    async fn memory_db() -> Arc<SurrealDbClient> {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("in-memory surrealdb"),
        )
    }

    fn document(id: &str, content_ref: &str) -> ClaimDocument {
        ClaimDocument::with_id(
            id.into(),
            "CLM-1".into(),
            DocumentType::PoliceReport,
            512,
            content_ref.into(),
        )
    }

    async fn pipeline_with(
        db: Arc<SurrealDbClient>,
        content: Arc<StaticContent>,
    ) -> IndexingPipeline {
        IndexingPipeline::new(
            db,
            Arc::new(EmbeddingProvider::new_hashed(8)),
            content,
            1000,
            200,
        )
        .expect("pipeline")
    }

    #[tokio::test]
    async fn indexes_documents_with_provenance() {
        let db = memory_db().await;
        let content = Arc::new(StaticContent::new());
        content.insert("a.txt", "officer observed rear-end damage").await;
        content.insert("b.txt", "estimate totals four thousand dollars").await;

        let pipeline = pipeline_with(Arc::clone(&db), content).await;
        let documents = vec![document("doc-a", "a.txt"), document("doc-b", "b.txt")];

        let outcome = pipeline
            .index_documents("eng-1", &documents, &HashSet::new())
            .await;

        assert_eq!(outcome.indexed.len(), 2);
        assert!(outcome.failed.is_empty());
        assert!(outcome.chunk_count >= 2);

        let rows = EngineChunk::count_by_engine_id("eng-1", &db)
            .await
            .expect("count");
        assert_eq!(rows, outcome.chunk_count);

        let all: Vec<EngineChunk> = db.get_all_stored_items().await.expect("rows");
        assert!(all.iter().all(|c| c.engine_id == "eng-1"));
        assert!(all.iter().any(|c| c.document_id == "doc-a"));
        assert!(all.iter().any(|c| c.document_id == "doc-b"));
    }

    #[tokio::test]
    async fn skips_already_indexed_documents() {
        let db = memory_db().await;
        let content = Arc::new(StaticContent::new());
        content.insert("a.txt", "already indexed earlier").await;

        let pipeline = pipeline_with(Arc::clone(&db), content).await;
        let documents = vec![document("doc-a", "a.txt")];
        let already: HashSet<String> = ["doc-a".to_string()].into();

        let outcome = pipeline.index_documents("eng-1", &documents, &already).await;

        assert!(outcome.indexed.is_empty());
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.chunk_count, 0);
        assert_eq!(
            EngineChunk::count_by_engine_id("eng-1", &db)
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn one_failing_document_does_not_abort_the_rest() {
        let db = memory_db().await;
        let content = Arc::new(StaticContent::new());
        for name in ["a", "b", "c", "d"] {
            content
                .insert(format!("{name}.txt"), format!("claim evidence {name}"))
                .await;
        }

        let pipeline = pipeline_with(Arc::clone(&db), content).await;
        let documents = vec![
            document("doc-a", "a.txt"),
            document("doc-b", "b.txt"),
            document("doc-missing", "missing.txt"),
            document("doc-c", "c.txt"),
            document("doc-d", "d.txt"),
        ];

        let outcome = pipeline
            .index_documents("eng-1", &documents, &HashSet::new())
            .await;

        assert_eq!(outcome.indexed.len(), 4);
        assert_eq!(outcome.failed.len(), 1);
        let failed = outcome.failed.first().expect("failure record");
        assert_eq!(failed.document_id, "doc-missing");
        assert!((outcome.failure_fraction() - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn reindexing_upserts_instead_of_duplicating() {
        let db = memory_db().await;
        let content = Arc::new(StaticContent::new());
        content.insert("a.txt", "same text both passes").await;

        let pipeline = pipeline_with(Arc::clone(&db), content).await;
        let documents = vec![document("doc-a", "a.txt")];

        let first = pipeline
            .index_documents("eng-1", &documents, &HashSet::new())
            .await;
        let second = pipeline
            .index_documents("eng-1", &documents, &HashSet::new())
            .await;

        assert_eq!(first.chunk_count, second.chunk_count);
        assert_eq!(
            EngineChunk::count_by_engine_id("eng-1", &db)
                .await
                .expect("count"),
            first.chunk_count
        );
    }
}

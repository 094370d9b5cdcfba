use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use chrono::Utc;
use serde::Serialize;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, info};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::engine_chunk::{EngineChunk, ScoredChunk}},
    utils::{
        config::{AppConfig, EmbeddingBackend},
        embedding::EmbeddingProvider,
    },
};
use orchestrator::EngineLifecycleManager;

use crate::answer;

/// Answer to one claim question, every statement grounded in retrieved
/// chunks. `partial_index` tells the caller the engine is serving from an
/// incomplete index.
#[derive(Debug, Clone, Serialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub cited_document_ids: Vec<String>,
    pub confidence: f32,
    pub partial_index: bool,
    pub engine_id: String,
}

/// Answer-generation backend. `OpenAI` asks a chat model constrained by a
/// JSON schema; `Extractive` stitches the answer from the retrieved chunks
/// themselves, so offline deployments and tests need no external service.
pub enum AnswerGenerator {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
    },
    Extractive,
}

impl AnswerGenerator {
    /// The hashed embedding backend marks an offline deployment; answer
    /// generation follows the same switch.
    pub fn from_config(config: &AppConfig, client: Arc<Client<OpenAIConfig>>) -> Self {
        match config.embedding_backend {
            EmbeddingBackend::OpenAI => AnswerGenerator::OpenAI {
                client,
                model: config.query_model.clone(),
            },
            EmbeddingBackend::Hashed => AnswerGenerator::Extractive,
        }
    }

    async fn generate(
        &self,
        question: &str,
        hits: &[ScoredChunk],
    ) -> Result<(String, Vec<String>), AppError> {
        match self {
            AnswerGenerator::OpenAI { client, model } => {
                let context = answer::chunks_to_context(hits);
                let user_message = answer::create_user_message(&context, question);
                let request = answer::create_chat_request(model, user_message)?;
                let response = client.chat().create(request).await?;
                let parsed = answer::process_llm_response(response)?;
                let citations = answer::filter_citations(&parsed.references, hits);
                Ok((parsed.answer, citations))
            }
            AnswerGenerator::Extractive => {
                // Best chunk per document, in rank order.
                let mut citations: Vec<String> = Vec::new();
                let mut passages: Vec<&str> = Vec::new();
                for hit in hits {
                    if !citations.contains(&hit.chunk.document_id) {
                        citations.push(hit.chunk.document_id.clone());
                        passages.push(hit.chunk.text.as_str());
                    }
                }
                Ok((passages.join("\n\n"), citations))
            }
        }
    }
}

/// Front door for claim Q&A. Owns no engine state itself; everything flows
/// through the lifecycle manager so queries and expiry stay coordinated.
pub struct QueryService {
    db: Arc<SurrealDbClient>,
    manager: Arc<EngineLifecycleManager>,
    embedding: Arc<EmbeddingProvider>,
    generator: AnswerGenerator,
    top_k: u8,
    confidence_floor: f32,
}

impl QueryService {
    pub fn new(
        db: Arc<SurrealDbClient>,
        manager: Arc<EngineLifecycleManager>,
        embedding: Arc<EmbeddingProvider>,
        generator: AnswerGenerator,
        top_k: u8,
        confidence_floor: f32,
    ) -> Self {
        Self {
            db,
            manager,
            embedding,
            generator,
            top_k,
            confidence_floor,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        manager: Arc<EngineLifecycleManager>,
        embedding: Arc<EmbeddingProvider>,
        openai_client: Arc<Client<OpenAIConfig>>,
    ) -> Self {
        Self::new(
            db,
            manager,
            embedding,
            AnswerGenerator::from_config(config, openai_client),
            config.retrieval_top_k,
            config.confidence_floor,
        )
    }

    /// Answers one question about one claim. The readiness gate lives in
    /// `ensure_engine`: a claim below thresholds gets `NotReady` with the
    /// unmet conditions, never a fabricated answer.
    pub async fn answer(&self, claim_id: &str, question: &str) -> Result<GroundedAnswer, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("question must not be empty".into()));
        }

        let engine = self.manager.ensure_engine(claim_id).await?;
        let _lease = engine.acquire_lease().await?;

        let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);
        let query_embedding = Retry::spawn(retry_strategy, || self.embedding.embed(question))
            .await
            .map_err(|err| AppError::CapabilityUnavailable(format!("embedding: {err}")))?;

        let hits =
            EngineChunk::find_top_k(&engine.id, &query_embedding, self.top_k, &self.db).await?;

        let top_score = hits.first().map_or(0.0, |hit| hit.score);
        if hits.is_empty() || top_score < self.confidence_floor {
            debug!(
                claim_id,
                engine_id = %engine.id,
                hits = hits.len(),
                top_score,
                "retrieval below confidence floor"
            );
            return Err(AppError::InsufficientGrounding(format!(
                "no retrieved content answers the question (top score {top_score:.3})"
            )));
        }

        let (answer, cited_document_ids) = self.generator.generate(question, &hits).await?;

        let partial_index = {
            let meta = engine.meta.read().await;
            meta.is_partial()
        };
        engine.touch(Utc::now()).await;

        info!(
            claim_id,
            engine_id = %engine.id,
            citations = cited_document_ids.len(),
            confidence = top_score,
            partial_index,
            "question answered"
        );

        Ok(GroundedAnswer {
            answer,
            cited_document_ids,
            confidence: top_score,
            partial_index,
            engine_id: engine.id.clone(),
        })
    }
}

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{claim_document::ClaimDocument, engine_chunk::EngineChunk},
    },
    utils::config::{AppConfig, ThresholdConfig},
};
use indexing_pipeline::IndexingPipeline;

use crate::{
    engine::{compute_next_state, ActiveEngine, EngineState, EngineStatus, EngineTransition},
    threshold::{self, ReadinessDecision},
};

/// Broadcast result of one creation attempt. `None` until the creation task
/// finishes; the error is carried as a string so every waiter gets its own
/// `AppError`.
type CreationOutcome = Option<Result<Arc<ActiveEngine>, String>>;

enum EngineSlot {
    Creating(watch::Receiver<CreationOutcome>),
    Active(Arc<ActiveEngine>),
}

/// Owns every live engine. One slot per claim id; the slot table is the
/// single-flight mechanism: whoever installs the `Creating` slot runs the
/// creation, everyone else waits on its watch channel.
pub struct EngineLifecycleManager {
    db: Arc<SurrealDbClient>,
    pipeline: Arc<IndexingPipeline>,
    thresholds: ThresholdConfig,
    ttl: ChronoDuration,
    creation_timeout: Duration,
    engines: Arc<RwLock<HashMap<String, EngineSlot>>>,
}

impl EngineLifecycleManager {
    pub fn new(
        db: Arc<SurrealDbClient>,
        pipeline: Arc<IndexingPipeline>,
        thresholds: ThresholdConfig,
        ttl: ChronoDuration,
        creation_timeout: Duration,
    ) -> Self {
        Self {
            db,
            pipeline,
            thresholds,
            ttl,
            creation_timeout,
            engines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        pipeline: Arc<IndexingPipeline>,
    ) -> Self {
        Self::new(
            db,
            pipeline,
            config.thresholds.clone(),
            ChronoDuration::hours(config.engine_ttl_hours),
            Duration::from_secs(config.creation_timeout_secs),
        )
    }

    /// Evaluates the claim's document feed against the thresholds. Pure with
    /// respect to engine state; a ready claim stays ready because documents
    /// only accumulate.
    pub async fn check_readiness(&self, claim_id: &str) -> Result<ReadinessDecision, AppError> {
        let documents = ClaimDocument::find_by_claim(claim_id, &self.db).await?;
        Ok(threshold::evaluate(&documents, &self.thresholds))
    }

    /// Returns the claim's active engine, creating it when the thresholds
    /// are met. Concurrent callers for the same claim share one creation;
    /// exactly one engine and one indexing pass happen no matter how many
    /// callers race.
    pub async fn ensure_engine(&self, claim_id: &str) -> Result<Arc<ActiveEngine>, AppError> {
        if let Some(waiting) = self.existing_slot(claim_id).await {
            return resolve_slot(claim_id, waiting).await;
        }

        // Threshold check happens outside the slot lock; readiness is
        // monotonic, so a stale read can only be pessimistic.
        let documents = ClaimDocument::find_by_claim(claim_id, &self.db).await?;
        let decision = threshold::evaluate(&documents, &self.thresholds);
        if !decision.ready {
            return Err(AppError::NotReady {
                reasons: decision.reasons,
            });
        }

        let receiver = {
            let mut engines = self.engines.write().await;
            match engines.get(claim_id) {
                Some(EngineSlot::Active(engine)) => return Ok(Arc::clone(engine)),
                Some(EngineSlot::Creating(receiver)) => receiver.clone(),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    engines.insert(claim_id.to_string(), EngineSlot::Creating(receiver.clone()));
                    self.spawn_creation(claim_id.to_string(), documents, sender);
                    receiver
                }
            }
        };

        await_creation(claim_id, receiver).await
    }

    /// Non-blocking lookup. `None` covers both absent and still-creating
    /// engines.
    pub async fn get_handle(&self, claim_id: &str) -> Option<Arc<ActiveEngine>> {
        match self.engines.read().await.get(claim_id) {
            Some(EngineSlot::Active(engine)) => Some(Arc::clone(engine)),
            _ => None,
        }
    }

    /// Indexes newly registered documents into the claim's engine. Claims
    /// without an engine are untouched; their documents wait in the feed
    /// until the engine is created. A creation in flight is awaited first:
    /// its indexing pass snapshotted the feed, so documents registered
    /// during CREATING are indexed here once the engine activates. Runs
    /// under a query lease so expiry cannot delete chunks mid-pass.
    pub async fn add_documents(
        &self,
        claim_id: &str,
        documents: &[ClaimDocument],
    ) -> Result<(), AppError> {
        let Some(slot) = self.existing_slot(claim_id).await else {
            return Ok(());
        };
        let Ok(engine) = resolve_slot(claim_id, slot).await else {
            // Creation failed; the documents stay in the feed for the next
            // ensure_engine.
            return Ok(());
        };
        let Ok(_lease) = engine.acquire_lease().await else {
            // Engine retired between lookup and lease; the documents stay in
            // the feed for the next engine.
            return Ok(());
        };

        let already_indexed = engine.meta.read().await.indexed_documents.clone();
        let outcome = self
            .pipeline
            .index_documents(&engine.id, documents, &already_indexed)
            .await;
        engine.apply_outcome(outcome).await;

        Ok(())
    }

    /// Expires the claim's engine: removes the slot, drains in-flight
    /// leases, then deletes the engine's chunks. Idempotent; expiring an
    /// absent or still-creating engine returns `false` without touching
    /// anything.
    pub async fn expire(&self, claim_id: &str) -> Result<bool, AppError> {
        let engine = {
            let mut engines = self.engines.write().await;
            match engines.get(claim_id) {
                Some(EngineSlot::Active(_)) => match engines.remove(claim_id) {
                    Some(EngineSlot::Active(engine)) => engine,
                    _ => return Ok(false),
                },
                // A creation in flight is left alone; its engine gets a full
                // TTL once active.
                Some(EngineSlot::Creating(_)) | None => return Ok(false),
            }
        };

        engine.retire().await?;
        engine.drain().await;

        EngineChunk::delete_by_engine_id(&engine.id, &self.db).await?;
        {
            let mut meta = engine.meta.write().await;
            meta.state = compute_next_state(meta.state, EngineTransition::FinishExpiry)?;
        }

        info!(
            claim_id,
            engine_id = %engine.id,
            "engine expired and index released"
        );

        Ok(true)
    }

    /// One scan over the live engines, expiring every one past its
    /// deadline. Returns the claim ids that were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let overdue: Vec<String> = {
            let engines = self.engines.read().await;
            engines
                .iter()
                .filter_map(|(claim_id, slot)| match slot {
                    EngineSlot::Active(engine) if engine.is_expired(now) => {
                        Some(claim_id.clone())
                    }
                    _ => None,
                })
                .collect()
        };

        let mut expired = Vec::new();
        for claim_id in overdue {
            match self.expire(&claim_id).await {
                Ok(true) => expired.push(claim_id),
                Ok(false) => {}
                Err(err) => {
                    error!(claim_id, error = %err, "failed to expire overdue engine");
                }
            }
        }

        Ok(expired)
    }

    /// Coarse lifecycle position of the claim's slot; the absence of a slot
    /// is itself a state.
    pub async fn engine_state(&self, claim_id: &str) -> EngineState {
        match self.engines.read().await.get(claim_id) {
            Some(EngineSlot::Active(_)) => EngineState::Active,
            Some(EngineSlot::Creating(_)) => EngineState::Creating,
            None => EngineState::Absent,
        }
    }

    /// Full status snapshot for the observability endpoint. Only active
    /// engines carry one; callers combine this with `engine_state` for
    /// absent and still-creating claims.
    pub async fn engine_status(&self, claim_id: &str, now: DateTime<Utc>) -> Option<EngineStatus> {
        let engine = self.get_handle(claim_id).await?;
        Some(engine.status(now).await)
    }

    async fn existing_slot(&self, claim_id: &str) -> Option<SlotClaim> {
        match self.engines.read().await.get(claim_id) {
            Some(EngineSlot::Active(engine)) => Some(SlotClaim::Ready(Arc::clone(engine))),
            Some(EngineSlot::Creating(receiver)) => Some(SlotClaim::Wait(receiver.clone())),
            None => None,
        }
    }

    fn spawn_creation(
        &self,
        claim_id: String,
        documents: Vec<ClaimDocument>,
        sender: watch::Sender<CreationOutcome>,
    ) {
        let db = Arc::clone(&self.db);
        let pipeline = Arc::clone(&self.pipeline);
        let engines = Arc::clone(&self.engines);
        let ttl = self.ttl;
        let timeout = self.creation_timeout;

        // The creation runs in its own task so a waiter cancelling its
        // request cannot abandon a half-built engine.
        tokio::spawn(async move {
            run_creation(db, pipeline, engines, claim_id, documents, ttl, timeout, sender).await;
        });
    }
}

enum SlotClaim {
    Ready(Arc<ActiveEngine>),
    Wait(watch::Receiver<CreationOutcome>),
}

async fn resolve_slot(claim_id: &str, claim: SlotClaim) -> Result<Arc<ActiveEngine>, AppError> {
    match claim {
        SlotClaim::Ready(engine) => Ok(engine),
        SlotClaim::Wait(receiver) => await_creation(claim_id, receiver).await,
    }
}

async fn await_creation(
    claim_id: &str,
    mut receiver: watch::Receiver<CreationOutcome>,
) -> Result<Arc<ActiveEngine>, AppError> {
    loop {
        let outcome = receiver.borrow().clone();
        if let Some(result) = outcome {
            return result.map_err(AppError::CreationFailure);
        }
        if receiver.changed().await.is_err() {
            warn!(claim_id, "engine creation task dropped without a result");
            return Err(AppError::CreationFailure(
                "engine creation ended without a result".into(),
            ));
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_creation(
    db: Arc<SurrealDbClient>,
    pipeline: Arc<IndexingPipeline>,
    engines: Arc<RwLock<HashMap<String, EngineSlot>>>,
    claim_id: String,
    documents: Vec<ClaimDocument>,
    ttl: ChronoDuration,
    timeout: Duration,
    sender: watch::Sender<CreationOutcome>,
) {
    debug_assert!(
        compute_next_state(EngineState::Absent, EngineTransition::BeginCreation).is_ok()
    );

    let engine_id = ActiveEngine::new_engine_id();
    let created_at = Utc::now();
    let nothing_indexed = HashSet::new();

    let indexing = pipeline.index_documents(&engine_id, &documents, &nothing_indexed);
    let outcome = match tokio::time::timeout(timeout, indexing).await {
        Ok(outcome) => outcome,
        Err(_) => {
            fail_creation(
                &db,
                &engines,
                &claim_id,
                &engine_id,
                format!("engine creation timed out after {}s", timeout.as_secs()),
                &sender,
            )
            .await;
            return;
        }
    };

    // Nothing indexed means no engine: the claim was ready, so the feed was
    // non-empty and every document failed.
    if outcome.indexed.is_empty() {
        let detail = outcome
            .failed
            .first()
            .map(|f| format!("{}: {}", f.document_id, f.reason))
            .unwrap_or_else(|| "no documents produced any chunks".to_string());
        fail_creation(
            &db,
            &engines,
            &claim_id,
            &engine_id,
            format!("all documents failed to index ({detail})"),
            &sender,
        )
        .await;
        return;
    }

    let expires_at = created_at + ttl;
    let engine = Arc::new(ActiveEngine::new(
        engine_id,
        claim_id.clone(),
        created_at,
        expires_at,
        &outcome,
    ));
    debug_assert!(compute_next_state(EngineState::Creating, EngineTransition::Activate).is_ok());

    {
        let mut slots = engines.write().await;
        slots.insert(claim_id.clone(), EngineSlot::Active(Arc::clone(&engine)));
    }

    info!(
        claim_id,
        engine_id = %engine.id,
        indexed = outcome.indexed.len(),
        failed = outcome.failed.len(),
        chunks = outcome.chunk_count,
        partial = !outcome.failed.is_empty(),
        %expires_at,
        "engine created"
    );

    let _ = sender.send(Some(Ok(engine)));
}

/// Tears down a failed creation: partial chunk rows are released, the slot
/// is vacated so a later call can retry, and every waiter learns the reason.
async fn fail_creation(
    db: &SurrealDbClient,
    engines: &RwLock<HashMap<String, EngineSlot>>,
    claim_id: &str,
    engine_id: &str,
    reason: String,
    sender: &watch::Sender<CreationOutcome>,
) {
    debug_assert!(
        compute_next_state(EngineState::Creating, EngineTransition::FailCreation).is_ok()
    );

    if let Err(err) = EngineChunk::delete_by_engine_id(engine_id, db).await {
        error!(
            claim_id,
            engine_id,
            error = %err,
            "failed to release chunks of an aborted engine creation"
        );
    }

    {
        let mut slots = engines.write().await;
        if matches!(slots.get(claim_id), Some(EngineSlot::Creating(_))) {
            slots.remove(claim_id);
        }
    }

    warn!(claim_id, engine_id, reason, "engine creation failed");
    let _ = sender.send(Some(Err(reason)));
}

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use state_machines::state_machine;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use uuid::Uuid;

use common::error::AppError;
use indexing_pipeline::{FailedDocument, IndexOutcome};

#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum EngineState {
    #[serde(rename = "absent")]
    #[default]
    Absent,
    #[serde(rename = "creating")]
    Creating,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "expiring")]
    Expiring,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Absent => "absent",
            EngineState::Creating => "creating",
            EngineState::Active => "active",
            EngineState::Expiring => "expiring",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum EngineTransition {
    BeginCreation,
    Activate,
    FailCreation,
    BeginExpiry,
    FinishExpiry,
}

impl EngineTransition {
    fn as_str(&self) -> &'static str {
        match self {
            EngineTransition::BeginCreation => "begin_creation",
            EngineTransition::Activate => "activate",
            EngineTransition::FailCreation => "fail_creation",
            EngineTransition::BeginExpiry => "begin_expiry",
            EngineTransition::FinishExpiry => "finish_expiry",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: EngineLifecycleMachine,
        initial: Absent,
        states: [Absent, Creating, Active, Expiring],
        events {
            begin_creation {
                transition: { from: Absent, to: Creating }
            }
            activate {
                transition: { from: Creating, to: Active }
            }
            fail_creation {
                transition: { from: Creating, to: Absent }
            }
            begin_expiry {
                transition: { from: Active, to: Expiring }
            }
            finish_expiry {
                transition: { from: Expiring, to: Absent }
            }
        }
    }

    pub(super) fn absent() -> EngineLifecycleMachine<(), Absent> {
        EngineLifecycleMachine::new(())
    }

    pub(super) fn creating() -> EngineLifecycleMachine<(), Creating> {
        absent()
            .begin_creation()
            .expect("begin_creation transition from Absent should exist")
    }

    pub(super) fn active() -> EngineLifecycleMachine<(), Active> {
        creating()
            .activate()
            .expect("activate transition from Creating should exist")
    }

    pub(super) fn expiring() -> EngineLifecycleMachine<(), Expiring> {
        active()
            .begin_expiry()
            .expect("begin_expiry transition from Active should exist")
    }
}

fn invalid_transition(state: EngineState, event: EngineTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid engine transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

pub(crate) fn compute_next_state(
    state: EngineState,
    event: EngineTransition,
) -> Result<EngineState, AppError> {
    use lifecycle::*;
    match (state, event) {
        (EngineState::Absent, EngineTransition::BeginCreation) => absent()
            .begin_creation()
            .map(|_| EngineState::Creating)
            .map_err(|_| invalid_transition(state, event)),
        (EngineState::Creating, EngineTransition::Activate) => creating()
            .activate()
            .map(|_| EngineState::Active)
            .map_err(|_| invalid_transition(state, event)),
        (EngineState::Creating, EngineTransition::FailCreation) => creating()
            .fail_creation()
            .map(|_| EngineState::Absent)
            .map_err(|_| invalid_transition(state, event)),
        (EngineState::Active, EngineTransition::BeginExpiry) => active()
            .begin_expiry()
            .map(|_| EngineState::Expiring)
            .map_err(|_| invalid_transition(state, event)),
        (EngineState::Expiring, EngineTransition::FinishExpiry) => expiring()
            .finish_expiry()
            .map(|_| EngineState::Absent)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// Mutable portion of an active engine, guarded by one lock so feed updates
/// and status reads see a consistent view.
#[derive(Debug)]
pub struct EngineMeta {
    pub state: EngineState,
    pub indexed_documents: HashSet<String>,
    pub failed_documents: Vec<FailedDocument>,
    pub chunk_count: usize,
    pub last_accessed_at: DateTime<Utc>,
}

impl EngineMeta {
    /// An engine with at least one failed document serves answers from a
    /// partial index until a later feed pass repairs it.
    pub fn is_partial(&self) -> bool {
        !self.failed_documents.is_empty()
    }
}

/// One claim's live RAG engine. The identity fields never change after
/// activation; everything mutable lives behind `meta`. Queries hold a read
/// lease on `gate`, expiry takes the write side to drain them.
pub struct ActiveEngine {
    pub id: String,
    pub claim_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub meta: RwLock<EngineMeta>,
    gate: Arc<RwLock<()>>,
    retired: AtomicBool,
}

/// Held for the duration of one query (or feed delta) against an engine.
/// While any lease is out, expiry cannot delete the engine's chunks.
pub struct EngineLease {
    _guard: OwnedRwLockReadGuard<()>,
}

impl ActiveEngine {
    pub fn new(
        id: String,
        claim_id: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        outcome: &IndexOutcome,
    ) -> Self {
        Self {
            id,
            claim_id,
            created_at,
            expires_at,
            meta: RwLock::new(EngineMeta {
                state: EngineState::Active,
                indexed_documents: outcome.indexed.iter().cloned().collect(),
                failed_documents: outcome.failed.clone(),
                chunk_count: outcome.chunk_count,
                last_accessed_at: created_at,
            }),
            gate: Arc::new(RwLock::new(())),
            retired: AtomicBool::new(false),
        }
    }

    pub fn new_engine_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Acquires a query lease, or reports the engine gone when expiry has
    /// already claimed it. Checked again after the gate opens because a
    /// waiter may only get through once draining finished.
    pub async fn acquire_lease(&self) -> Result<EngineLease, AppError> {
        if self.retired.load(Ordering::Acquire) {
            return Err(AppError::EngineNotFound(self.claim_id.clone()));
        }

        let guard = Arc::clone(&self.gate).read_owned().await;

        if self.retired.load(Ordering::Acquire) {
            return Err(AppError::EngineNotFound(self.claim_id.clone()));
        }

        Ok(EngineLease { _guard: guard })
    }

    /// Marks the engine as leaving service. New lease requests fail from
    /// this point on; in-flight leases are unaffected until `drain`.
    pub(crate) async fn retire(&self) -> Result<(), AppError> {
        let mut meta = self.meta.write().await;
        meta.state = compute_next_state(meta.state, EngineTransition::BeginExpiry)?;
        self.retired.store(true, Ordering::Release);
        Ok(())
    }

    /// Waits until every outstanding lease has been released.
    pub(crate) async fn drain(&self) {
        let _exclusive = self.gate.write().await;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> ChronoDuration {
        (self.expires_at - now).max(ChronoDuration::zero())
    }

    pub async fn touch(&self, now: DateTime<Utc>) {
        self.meta.write().await.last_accessed_at = now;
    }

    /// Folds a feed-delta indexing pass into the engine. Documents that
    /// indexed this time are removed from the failed list, so a partial
    /// engine can heal.
    pub async fn apply_outcome(&self, outcome: IndexOutcome) {
        let mut meta = self.meta.write().await;
        meta.indexed_documents.extend(outcome.indexed.iter().cloned());
        meta.chunk_count += outcome.chunk_count;
        let repaired: Vec<String> = outcome.indexed;
        meta.failed_documents
            .retain(|failed| !repaired.contains(&failed.document_id));
        for failure in outcome.failed {
            if !meta
                .failed_documents
                .iter()
                .any(|f| f.document_id == failure.document_id)
            {
                meta.failed_documents.push(failure);
            }
        }
    }

    pub async fn status(&self, now: DateTime<Utc>) -> EngineStatus {
        let meta = self.meta.read().await;
        EngineStatus {
            engine_id: self.id.clone(),
            claim_id: self.claim_id.clone(),
            state: meta.state,
            created_at: self.created_at,
            expires_at: self.expires_at,
            ttl_remaining_secs: self.ttl_remaining(now).num_seconds(),
            last_accessed_at: meta.last_accessed_at,
            indexed_documents: meta.indexed_documents.len(),
            failed_documents: meta.failed_documents.clone(),
            chunk_count: meta.chunk_count,
            partial: meta.is_partial(),
        }
    }
}

/// Point-in-time snapshot of one engine, shaped for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub engine_id: String,
    pub claim_id: String,
    pub state: EngineState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_remaining_secs: i64,
    pub last_accessed_at: DateTime<Utc>,
    pub indexed_documents: usize,
    pub failed_documents: Vec<FailedDocument>,
    pub chunk_count: usize,
    pub partial: bool,
}

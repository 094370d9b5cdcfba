use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use object_store::{local::LocalFileSystem, path::Path as ObjectPath, ObjectStore};
use tokio::sync::RwLock;

use common::{error::AppError, storage::types::claim_document::ClaimDocument};

/// Content-access capability: resolves a document's opaque `content_ref`
/// into extracted text. OCR/transcription happen upstream; by the time a
/// document reaches this subsystem its reference points at plain text.
#[async_trait]
pub trait ContentAccess: Send + Sync {
    async fn fetch(&self, document: &ClaimDocument) -> Result<String, AppError>;
}

/// Object-store backed content access; the default deployment reads from a
/// local filesystem prefix.
pub struct ObjectStoreContent {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreContent {
    pub fn local(data_dir: &str) -> Result<Self, AppError> {
        let store = LocalFileSystem::new_with_prefix(data_dir)
            .map_err(|err| AppError::InternalError(format!("content store init: {err}")))?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContentAccess for ObjectStoreContent {
    async fn fetch(&self, document: &ClaimDocument) -> Result<String, AppError> {
        let path = ObjectPath::from(document.content_ref.as_str());
        let result = self.store.get(&path).await.map_err(|err| match err {
            object_store::Error::NotFound { .. } => {
                AppError::NotFound(format!("content for document {}", document.id))
            }
            other => AppError::CapabilityUnavailable(format!("content store: {other}")),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|err| AppError::CapabilityUnavailable(format!("content store: {err}")))?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// In-memory content map. Used by tests and local fixtures; a missing
/// reference behaves like a permanent fetch failure.
#[derive(Default)]
pub struct StaticContent {
    entries: RwLock<HashMap<String, String>>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, content_ref: impl Into<String>, text: impl Into<String>) {
        self.entries
            .write()
            .await
            .insert(content_ref.into(), text.into());
    }
}

#[async_trait]
impl ContentAccess for StaticContent {
    async fn fetch(&self, document: &ClaimDocument) -> Result<String, AppError> {
        self.entries
            .read()
            .await
            .get(&document.content_ref)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("content for document {}", document.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::claim_document::DocumentType;

    fn document(content_ref: &str) -> ClaimDocument {
        ClaimDocument::new(
            "CLM-1".into(),
            DocumentType::PoliceReport,
            64,
            content_ref.into(),
        )
    }

    #[tokio::test]
    async fn static_content_round_trip_and_missing_ref() {
        let content = StaticContent::new();
        content.insert("claims/CLM-1/report.txt", "rear-end collision").await;

        let found = content
            .fetch(&document("claims/CLM-1/report.txt"))
            .await
            .expect("fetch");
        assert_eq!(found, "rear-end collision");

        let missing = content.fetch(&document("claims/CLM-1/absent.txt")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn object_store_content_reads_local_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("estimate.txt"), "repair estimate $4,200")
            .expect("write fixture");

        let content = ObjectStoreContent::local(
            dir.path().to_str().expect("utf8 path"),
        )
        .expect("store");

        let text = content
            .fetch(&document("estimate.txt"))
            .await
            .expect("fetch");
        assert_eq!(text, "repair estimate $4,200");

        let missing = content.fetch(&document("missing.txt")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}

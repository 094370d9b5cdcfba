use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Claim evidence categories recognized by the readiness thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PoliceReport,
    Estimate,
    Photo,
    WitnessStatement,
    MedicalBill,
    AudioTranscript,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::PoliceReport => "police_report",
            DocumentType::Estimate => "estimate",
            DocumentType::Photo => "photo",
            DocumentType::WitnessStatement => "witness_statement",
            DocumentType::MedicalBill => "medical_bill",
            DocumentType::AudioTranscript => "audio_transcript",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

stored_object!(ClaimDocument, "claim_document", {
    claim_id: String,
    document_type: DocumentType,
    size_bytes: u64,
    /// Opaque handle into the content store; the raw bytes are not owned here.
    content_ref: String
});

impl ClaimDocument {
    pub fn new(
        claim_id: String,
        document_type: DocumentType,
        size_bytes: u64,
        content_ref: String,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            claim_id,
            document_type,
            size_bytes,
            content_ref,
        )
    }

    pub fn with_id(
        id: String,
        claim_id: String,
        document_type: DocumentType,
        size_bytes: u64,
        content_ref: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            claim_id,
            document_type,
            size_bytes,
            content_ref,
        }
    }

    /// Registers the document in the feed. Documents are append-only and
    /// immutable, so re-registering an existing id is a success no-op that
    /// returns the stored record.
    pub async fn register(self, db: &SurrealDbClient) -> Result<ClaimDocument, AppError> {
        if let Some(existing) = db.get_item::<ClaimDocument>(&self.id).await? {
            return Ok(existing);
        }

        match db.store_item(self.clone()).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Ok(self),
            // A concurrent registration of the same id wins the create; the
            // stored record is authoritative.
            Err(err) => match db.get_item::<ClaimDocument>(&self.id).await? {
                Some(existing) => Ok(existing),
                None => Err(AppError::from(err)),
            },
        }
    }

    /// All documents registered for a claim, oldest first.
    pub async fn find_by_claim(
        claim_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<ClaimDocument>, AppError> {
        let documents: Vec<ClaimDocument> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE claim_id = $claim_id
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("claim_id", claim_id.to_string()))
            .await?
            .take(0)?;

        Ok(documents)
    }

    /// Documents registered after the given instant, oldest first. Used by
    /// the feed to hand deltas to an already-active engine.
    pub async fn find_by_claim_since(
        claim_id: &str,
        since: DateTime<Utc>,
        db: &SurrealDbClient,
    ) -> Result<Vec<ClaimDocument>, AppError> {
        let documents: Vec<ClaimDocument> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE claim_id = $claim_id AND created_at > $since
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("claim_id", claim_id.to_string()))
            .bind(("since", SurrealDatetime::from(since)))
            .await?
            .take(0)?;

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory surrealdb")
    }

    #[tokio::test]
    async fn register_is_idempotent_by_document_id() {
        let db = memory_db().await;
        let document = ClaimDocument::with_id(
            "doc-1".into(),
            "CLM-100".into(),
            DocumentType::PoliceReport,
            2048,
            "claims/CLM-100/doc-1.txt".into(),
        );

        let first = document.clone().register(&db).await.expect("register");
        let second = document.register(&db).await.expect("re-register");

        assert_eq!(first.id, second.id);
        let all = ClaimDocument::find_by_claim("CLM-100", &db)
            .await
            .expect("find");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn find_by_claim_is_scoped_and_ordered() {
        let db = memory_db().await;

        let mut older = ClaimDocument::new(
            "CLM-200".into(),
            DocumentType::Photo,
            100,
            "claims/CLM-200/a.jpg".into(),
        );
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = ClaimDocument::new(
            "CLM-200".into(),
            DocumentType::Estimate,
            200,
            "claims/CLM-200/b.txt".into(),
        );
        let unrelated = ClaimDocument::new(
            "CLM-999".into(),
            DocumentType::Photo,
            50,
            "claims/CLM-999/c.jpg".into(),
        );

        let older_id = older.id.clone();
        let newer_id = newer.id.clone();
        older.register(&db).await.expect("register older");
        newer.register(&db).await.expect("register newer");
        unrelated.register(&db).await.expect("register unrelated");

        let documents = ClaimDocument::find_by_claim("CLM-200", &db)
            .await
            .expect("find");
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![older_id.as_str(), newer_id.as_str()]);
    }

    #[tokio::test]
    async fn find_since_returns_only_the_delta() {
        let db = memory_db().await;
        let cutoff = Utc::now();

        let mut before = ClaimDocument::new(
            "CLM-300".into(),
            DocumentType::Photo,
            10,
            "claims/CLM-300/old.jpg".into(),
        );
        before.created_at = cutoff - chrono::Duration::hours(1);
        before.register(&db).await.expect("register before");

        let mut after = ClaimDocument::new(
            "CLM-300".into(),
            DocumentType::WitnessStatement,
            20,
            "claims/CLM-300/new.txt".into(),
        );
        after.created_at = cutoff + chrono::Duration::seconds(1);
        let after_id = after.id.clone();
        after.register(&db).await.expect("register after");

        let delta = ClaimDocument::find_by_claim_since("CLM-300", cutoff, &db)
            .await
            .expect("delta");
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.first().map(|d| d.id.as_str()), Some(after_id.as_str()));
    }
}

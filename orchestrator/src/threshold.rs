use std::collections::BTreeSet;

use serde::Serialize;

use common::{
    storage::types::claim_document::{ClaimDocument, DocumentType},
    utils::config::ThresholdConfig,
};

/// Result of evaluating a claim's document feed against the readiness
/// thresholds. `reasons` is empty exactly when `ready` is true and always
/// lists unmet criteria in the same order: document count, type diversity,
/// required types, total size.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadinessDecision {
    pub ready: bool,
    pub reasons: Vec<String>,
    pub document_count: usize,
    pub distinct_types: usize,
    pub total_size_bytes: u64,
    pub missing_required_types: Vec<DocumentType>,
}

/// Pure threshold evaluation. Same documents and config always produce the
/// same decision; readiness only ever moves from false to true as documents
/// accumulate, because documents are append-only.
pub fn evaluate(documents: &[ClaimDocument], thresholds: &ThresholdConfig) -> ReadinessDecision {
    let document_count = documents.len();
    let present_types: BTreeSet<DocumentType> =
        documents.iter().map(|d| d.document_type).collect();
    let distinct_types = present_types.len();
    let total_size_bytes: u64 = documents.iter().map(|d| d.size_bytes).sum();

    let missing_required_types: Vec<DocumentType> = thresholds
        .required_types
        .iter()
        .copied()
        .filter(|required| !present_types.contains(required))
        .collect();

    let mut reasons = Vec::new();

    if document_count < thresholds.min_documents {
        let shortfall = thresholds.min_documents - document_count;
        reasons.push(if shortfall == 1 {
            "need 1 more document".to_string()
        } else {
            format!("need {shortfall} more documents")
        });
    }

    if distinct_types < thresholds.min_document_types {
        let shortfall = thresholds.min_document_types - distinct_types;
        reasons.push(if shortfall == 1 {
            "need 1 more document type".to_string()
        } else {
            format!("need {shortfall} more document types")
        });
    }

    if !missing_required_types.is_empty() {
        let names: Vec<&str> = missing_required_types.iter().map(|t| t.as_str()).collect();
        reasons.push(format!(
            "missing required document types: {}",
            names.join(", ")
        ));
    }

    if total_size_bytes < thresholds.min_total_size_bytes {
        let shortfall = thresholds.min_total_size_bytes - total_size_bytes;
        reasons.push(format!("need {shortfall} more bytes of document content"));
    }

    ReadinessDecision {
        ready: reasons.is_empty(),
        reasons,
        document_count,
        distinct_types,
        total_size_bytes,
        missing_required_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(claim_id: &str, document_type: DocumentType, size_bytes: u64) -> ClaimDocument {
        ClaimDocument::new(claim_id.into(), document_type, size_bytes, "ref".into())
    }

    #[test]
    fn empty_feed_reports_every_shortfall() {
        let thresholds = ThresholdConfig {
            min_total_size_bytes: 1024,
            required_types: vec![DocumentType::PoliceReport],
            ..ThresholdConfig::default()
        };

        let decision = evaluate(&[], &thresholds);

        assert!(!decision.ready);
        assert_eq!(decision.document_count, 0);
        assert_eq!(
            decision.reasons,
            vec![
                "need 3 more documents".to_string(),
                "need 2 more document types".to_string(),
                "missing required document types: police_report".to_string(),
                "need 1024 more bytes of document content".to_string(),
            ]
        );
    }

    #[test]
    fn one_document_short_names_the_exact_shortfall() {
        let documents = vec![
            document("CLM-1", DocumentType::PoliceReport, 100),
            document("CLM-1", DocumentType::Photo, 100),
        ];

        let decision = evaluate(&documents, &ThresholdConfig::default());

        assert!(!decision.ready);
        assert_eq!(decision.reasons, vec!["need 1 more document".to_string()]);
        assert_eq!(decision.document_count, 2);
        assert_eq!(decision.distinct_types, 2);
    }

    #[test]
    fn defaults_are_met_by_three_documents_of_two_types() {
        let documents = vec![
            document("CLM-1", DocumentType::PoliceReport, 100),
            document("CLM-1", DocumentType::Photo, 100),
            document("CLM-1", DocumentType::Photo, 100),
        ];

        let decision = evaluate(&documents, &ThresholdConfig::default());

        assert!(decision.ready);
        assert!(decision.reasons.is_empty());
        assert_eq!(decision.total_size_bytes, 300);
    }

    #[test]
    fn required_types_must_all_be_present() {
        let thresholds = ThresholdConfig {
            required_types: vec![DocumentType::PoliceReport, DocumentType::Estimate],
            ..ThresholdConfig::default()
        };
        let documents = vec![
            document("CLM-1", DocumentType::PoliceReport, 100),
            document("CLM-1", DocumentType::Photo, 100),
            document("CLM-1", DocumentType::Photo, 100),
        ];

        let decision = evaluate(&documents, &thresholds);

        assert!(!decision.ready);
        assert_eq!(decision.missing_required_types, vec![DocumentType::Estimate]);
        assert_eq!(
            decision.reasons,
            vec!["missing required document types: estimate".to_string()]
        );
    }

    #[test]
    fn readiness_is_monotonic_as_documents_accumulate() {
        let thresholds = ThresholdConfig {
            min_total_size_bytes: 250,
            ..ThresholdConfig::default()
        };

        let mut documents = Vec::new();
        let feed = [
            (DocumentType::PoliceReport, 100),
            (DocumentType::Photo, 50),
            (DocumentType::Photo, 50),
            (DocumentType::Estimate, 100),
            (DocumentType::Photo, 10),
        ];

        let mut became_ready_at = None;
        for (index, (document_type, size)) in feed.into_iter().enumerate() {
            documents.push(document("CLM-1", document_type, size));
            let decision = evaluate(&documents, &thresholds);
            if decision.ready && became_ready_at.is_none() {
                became_ready_at = Some(index);
            }
            if let Some(ready_index) = became_ready_at {
                assert!(
                    decision.ready,
                    "readiness regressed after becoming ready at document {ready_index}"
                );
            }
        }

        assert_eq!(became_ready_at, Some(3));
    }
}

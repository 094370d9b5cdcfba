use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        ResponseFormat, ResponseFormatJsonSchema,
    },
};
use serde::Deserialize;
use serde_json::{json, Value};

use common::{error::AppError, storage::types::engine_chunk::ScoredChunk};

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a claims-processing assistant. \
Answer the adjuster's question using ONLY the supplied claim context. \
Every statement must be supported by the context; cite the document_id of \
each supporting chunk in the references. If the context does not contain \
the answer, say so plainly instead of guessing.";

#[derive(Debug, Deserialize)]
pub struct CitedDocument {
    pub document_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmAnswer {
    pub answer: String,
    pub references: Vec<CitedDocument>,
}

/// Retrieved chunks as JSON context for the model, provenance included so
/// citations can name document ids.
pub fn chunks_to_context(hits: &[ScoredChunk]) -> Value {
    fn round_score(value: f32) -> f64 {
        (f64::from(value) * 1000.0).round() / 1000.0
    }

    json!(hits
        .iter()
        .map(|hit| {
            json!({
                "document_id": hit.chunk.document_id,
                "chunk_index": hit.chunk.chunk_index,
                "content": hit.chunk.text,
                "score": round_score(hit.score),
            })
        })
        .collect::<Vec<_>>())
}

pub fn create_user_message(context: &Value, question: &str) -> String {
    format!(
        r"
        Claim Context:
        ==================
        {context}

        Adjuster Question:
        ==================
        {question}
        "
    )
}

fn grounded_answer_schema() -> Value {
    json!({
       "type": "object",
       "properties": {
           "answer": { "type": "string" },
           "references": {
               "type": "array",
               "items": {
                   "type": "object",
                   "properties": {
                       "document_id": { "type": "string" },
                   },
               "required": ["document_id"],
               "additionalProperties": false,
               }
           }
       },
       "required": ["answer", "references"],
       "additionalProperties": false
    })
}

pub fn create_chat_request(
    model: &str,
    user_message: String,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("Grounded claim question answering".into()),
            name: "grounded_claim_answer".into(),
            schema: Some(grounded_answer_schema()),
            strict: Some(true),
        },
    };

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(ANSWER_SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .response_format(response_format)
        .build()
}

pub fn process_llm_response(
    response: CreateChatCompletionResponse,
) -> Result<LlmAnswer, AppError> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or(AppError::LLMParsing(
            "No content found in LLM response".into(),
        ))
        .and_then(|content| {
            serde_json::from_str::<LlmAnswer>(content).map_err(|e| {
                AppError::LLMParsing(format!("Failed to parse LLM response into an answer: {e}"))
            })
        })
}

/// Citations are constrained to documents that were actually retrieved;
/// anything else the model names is dropped. Order follows retrieval rank,
/// deduplicated.
pub fn filter_citations(cited: &[CitedDocument], hits: &[ScoredChunk]) -> Vec<String> {
    let mut citations = Vec::new();
    for hit in hits {
        let document_id = &hit.chunk.document_id;
        if citations.contains(document_id) {
            continue;
        }
        if cited.iter().any(|c| &c.document_id == document_id) {
            citations.push(document_id.clone());
        }
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::engine_chunk::EngineChunk;

    fn hit(document_id: &str, chunk_index: u32, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: EngineChunk::new(
                "eng-1".into(),
                "CLM-1".into(),
                document_id.into(),
                chunk_index,
                format!("chunk {chunk_index} of {document_id}"),
                vec![0.0; 3],
            ),
            score,
        }
    }

    #[test]
    fn context_carries_provenance_and_rounded_scores() {
        let hits = vec![hit("doc-a", 0, 0.91234), hit("doc-b", 2, 0.5)];
        let context = chunks_to_context(&hits);

        let entries = context.as_array().expect("array");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["document_id"], "doc-a");
        assert_eq!(entries[0]["score"], 0.912);
        assert_eq!(entries[1]["chunk_index"], 2);
    }

    #[test]
    fn citations_are_filtered_to_retrieved_documents_in_rank_order() {
        let hits = vec![hit("doc-b", 0, 0.9), hit("doc-a", 0, 0.8), hit("doc-b", 1, 0.7)];
        let cited = vec![
            CitedDocument {
                document_id: "doc-a".into(),
            },
            CitedDocument {
                document_id: "doc-b".into(),
            },
            CitedDocument {
                document_id: "doc-fabricated".into(),
            },
        ];

        let citations = filter_citations(&cited, &hits);
        assert_eq!(citations, vec!["doc-b".to_string(), "doc-a".to_string()]);
    }

    #[test]
    fn chat_request_pins_model_and_json_schema() {
        let request =
            create_chat_request("gpt-4o-mini", "question".into()).expect("request builds");
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert!(matches!(
            request.response_format,
            Some(ResponseFormat::JsonSchema { .. })
        ));
    }

    #[test]
    fn llm_answer_parses_from_schema_shaped_json() {
        let parsed: LlmAnswer = serde_json::from_str(
            r#"{"answer":"The repair estimate totals $4,200.","references":[{"document_id":"doc-a"}]}"#,
        )
        .expect("parse");
        assert!(parsed.answer.contains("4,200"));
        assert_eq!(parsed.references.len(), 1);
        assert_eq!(parsed.references[0].document_id, "doc-a");
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::storage::types::claim_document::DocumentType;

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    OpenAI,
    Hashed,
}

/// Document-accumulation gate for engine creation. Loaded once at startup,
/// immutable for the life of the process.
#[derive(Clone, Deserialize, Debug)]
pub struct ThresholdConfig {
    #[serde(default = "default_min_documents")]
    pub min_documents: usize,
    #[serde(default = "default_min_document_types")]
    pub min_document_types: usize,
    /// Document types that must all be present. Empty means no specific
    /// type is required.
    #[serde(default)]
    pub required_types: Vec<DocumentType>,
    #[serde(default)]
    pub min_total_size_bytes: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_documents: default_min_documents(),
            min_document_types: default_min_document_types(),
            required_types: Vec::new(),
            min_total_size_bytes: 0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_documents < 1 {
            return Err("thresholds.min_documents must be at least 1".into());
        }
        if self.min_document_types < 1 {
            return Err("thresholds.min_document_types must be at least 1".into());
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    /// Service-level key expected on protected API routes.
    pub api_key: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_query_model")]
    pub query_model: String,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default = "default_engine_ttl_hours")]
    pub engine_ttl_hours: i64,
    #[serde(default = "default_expiry_scan_interval_secs")]
    pub expiry_scan_interval_secs: u64,
    #[serde(default = "default_creation_timeout_secs")]
    pub creation_timeout_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: u8,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
}

fn default_min_documents() -> usize {
    3
}

fn default_min_document_types() -> usize {
    2
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_query_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_engine_ttl_hours() -> i64 {
    24
}

fn default_expiry_scan_interval_secs() -> u64 {
    300
}

fn default_creation_timeout_secs() -> u64 {
    120
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_retrieval_top_k() -> u8 {
    5
}

fn default_confidence_floor() -> f32 {
    0.25
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "claims".to_string(),
            surrealdb_database: "rag".to_string(),
            http_port: 0,
            api_key: String::new(),
            data_dir: default_data_dir(),
            openai_base_url: default_base_url(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            query_model: default_query_model(),
            thresholds: ThresholdConfig::default(),
            engine_ttl_hours: default_engine_ttl_hours(),
            expiry_scan_interval_secs: default_expiry_scan_interval_secs(),
            creation_timeout_secs: default_creation_timeout_secs(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            retrieval_top_k: default_retrieval_top_k(),
            confidence_floor: default_confidence_floor(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let config: AppConfig = config.try_deserialize()?;
    config.thresholds.validate().map_err(ConfigError::Message)?;

    Ok(config)
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    #[default]
    OpenAI,
    FastEmbed,
    Hashed,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default = "default_meta_collection")]
    pub meta_collection: String,
    #[serde(default = "default_message_collection")]
    pub message_collection: String,
    #[serde(default = "default_user_document_prefix")]
    pub user_document_collection_prefix: String,
    /// Named vectors searched by the hybrid query. Empty means the unnamed default vector.
    #[serde(default)]
    pub hybrid_vector_names: Vec<String>,
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: u64,
    #[serde(default = "default_document_context_limit")]
    pub document_context_limit: u64,

    #[serde(default = "default_context_window")]
    pub default_context_window: usize,
    #[serde(default = "default_max_context_window")]
    pub max_context_window: usize,
    #[serde(default = "default_history_char_budget")]
    pub history_char_budget: usize,
    #[serde(default = "default_true")]
    pub chat_history_enabled: bool,
    #[serde(default = "default_true")]
    pub pdf_context_enabled: bool,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,

    pub http_port: u16,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_temperature() -> f32 {
    0.3
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_meta_collection() -> String {
    "Meta Collection".to_string()
}

fn default_message_collection() -> String {
    "chat_messages".to_string()
}

fn default_user_document_prefix() -> String {
    "user_docs_".to_string()
}

const fn default_retrieval_limit() -> u64 {
    10
}

const fn default_document_context_limit() -> u64 {
    5
}

const fn default_context_window() -> usize {
    8192
}

const fn default_max_context_window() -> usize {
    32000
}

const fn default_history_char_budget() -> usize {
    12_000
}

const fn default_true() -> bool {
    true
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimensions() -> u32 {
    1536
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            chat_model: default_chat_model(),
            default_temperature: default_temperature(),
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "philosophy".to_string(),
            surrealdb_database: "chat".to_string(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key: None,
            meta_collection: default_meta_collection(),
            message_collection: default_message_collection(),
            user_document_collection_prefix: default_user_document_prefix(),
            hybrid_vector_names: Vec::new(),
            retrieval_limit: default_retrieval_limit(),
            document_context_limit: default_document_context_limit(),
            default_context_window: default_context_window(),
            max_context_window: default_max_context_window(),
            history_char_budget: default_history_char_budget(),
            chat_history_enabled: true,
            pdf_context_enabled: true,
            embedding_backend: EmbeddingBackendKind::default(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            http_port: 8000,
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("hybrid_vector_names"),
        )
        .build()?;

    config.try_deserialize()
}

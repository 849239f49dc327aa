use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Process-wide configuration, loaded once at startup.
///
/// Secrets (`*_api_token`, `*_api_key`) have no defaults: a missing secret
/// fails `get_config` fast with a `ConfigError`, the fatal path from the
/// configuration contract. Everything else defaults to a sane value so a
/// local run only needs the secrets set.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Ticketing platform API user (email or user id).
    pub ticketing_api_user: String,
    /// Ticketing platform API token.
    pub ticketing_api_token: String,
    /// Ticketing platform domain, e.g. `acme.zendesk.com`.
    pub ticketing_domain: String,

    /// Embedding provider API key.
    pub embedding_api_key: String,
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: u32,

    /// Vector store connection (SurrealDB).
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,
    #[serde(default = "default_vector_index_name")]
    pub vector_index_name: String,

    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_embedding_inter_batch_delay_secs")]
    pub embedding_inter_batch_delay_secs: u64,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Tag stamped into every vector's `source_tag` and used as the
    /// `<run-tag>` component of vector ids, distinguishing this deployment's
    /// vectors from any other source sharing the same store.
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> u32 {
    1536
}

fn default_surrealdb_namespace() -> String {
    "ticket_ingestion".to_string()
}

fn default_surrealdb_database() -> String {
    "knowledge_base".to_string()
}

fn default_vector_index_name() -> String {
    "idx_ticket_chunk_embedding".to_string()
}

fn default_enrichment_concurrency() -> usize {
    10
}

fn default_embedding_batch_size() -> usize {
    50
}

fn default_embedding_inter_batch_delay_secs() -> u64 {
    1
}

fn default_max_chunk_chars() -> usize {
    4000
}

fn default_source_tag() -> String {
    "zendesk".to_string()
}

/// Loads configuration from an optional `config` file layered with
/// environment variables, the latter taking precedence.
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

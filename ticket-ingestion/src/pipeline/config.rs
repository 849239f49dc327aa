use std::time::Duration;

use common::utils::config::AppConfig;

/// Tuning knobs for a single orchestrator run, bounded by the concurrency
/// and batching limits of the external APIs it drives.
#[derive(Debug, Clone)]
pub struct OrchestratorTuning {
    pub enrichment_concurrency: usize,
    pub embedding_batch_size: usize,
    pub embedding_inter_batch_delay: Duration,
    pub max_chunk_chars: usize,
}

impl Default for OrchestratorTuning {
    fn default() -> Self {
        Self {
            enrichment_concurrency: 10,
            embedding_batch_size: 50,
            embedding_inter_batch_delay: Duration::from_secs(1),
            max_chunk_chars: 4000,
        }
    }
}

impl OrchestratorTuning {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            enrichment_concurrency: config.enrichment_concurrency,
            embedding_batch_size: config.embedding_batch_size,
            embedding_inter_batch_delay: Duration::from_secs(config.embedding_inter_batch_delay_secs),
            max_chunk_chars: config.max_chunk_chars,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tuning: OrchestratorTuning,
    pub source_tag: String,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn new(source_tag: String) -> Self {
        Self { tuning: OrchestratorTuning::default(), source_tag }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self { tuning: OrchestratorTuning::from_app_config(config), source_tag: config.source_tag.clone() }
    }
}

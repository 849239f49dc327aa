use chrono::{DateTime, NaiveDate, Utc};
use common::error::AppError;
use common::storage::types::chunk::Chunk;
use common::storage::types::enriched_ticket::EnrichedTicket;
use common::storage::types::field_descriptor::FieldDescriptor;
use common::storage::types::ticket::Ticket;
use std::collections::HashMap;
use tracing::error;

use super::config::OrchestratorConfig;

/// A chunk paired with the zero-based index it occupies within its own
/// ticket's chunk list, which [`super::stages::upsert`] folds into the
/// vector identifier.
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub index: usize,
}

/// Per-run mutable state the orchestrator threads through its phases.
///
/// The orchestrator owns this for the lifetime of one run and releases it on
/// completion; the registry and clients it references are shared and outlive
/// any single `RunContext`.
pub struct RunContext<'a> {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub run_timestamp: DateTime<Utc>,
    pub config: &'a OrchestratorConfig,

    pub field_schema: Option<HashMap<String, FieldDescriptor>>,
    pub tickets: Vec<Ticket>,
    pub enriched: Vec<EnrichedTicket>,
    pub chunks: Vec<IndexedChunk>,
    pub embeddings: Vec<Vec<f32>>,
    pub vector_count: usize,
}

impl<'a> RunContext<'a> {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate, run_timestamp: DateTime<Utc>, config: &'a OrchestratorConfig) -> Self {
        Self {
            start,
            end,
            run_timestamp,
            config,
            field_schema: None,
            tickets: Vec::new(),
            enriched: Vec::new(),
            chunks: Vec::new(),
            embeddings: Vec::new(),
            vector_count: 0,
        }
    }

    pub fn abort(&self, err: AppError) -> AppError {
        error!(
            start = %self.start,
            end = %self.end,
            error = %err,
            "ingestion run aborted"
        );
        err
    }
}

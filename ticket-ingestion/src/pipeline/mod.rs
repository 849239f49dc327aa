mod config;
mod context;
mod stages;
mod state;

pub use config::{OrchestratorConfig, OrchestratorTuning};

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::vector_store::{SurrealVectorStore, VectorStoreClient, VectorStoreConfig};
use common::utils::config::AppConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit_recorder::AuditRecorder;
use crate::embedding_client::EmbeddingClient;
use crate::enricher::TicketEnricher;
use crate::fetcher::TicketFetcher;
use crate::field_registry::FieldRegistry;
use crate::http_client::HttpClient;

use self::context::RunContext;
use self::stages::{audit, audit_failure, chunk, embed, enrich, fetch_fields, fetch_tickets, upsert};
use self::state::idle;

/// Summary payload of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub status: String,
    pub tickets_processed: usize,
    pub total_chunks: usize,
    pub processing_time_secs: f64,
    pub audit_record_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Ties the field registry, fetcher, enricher, chunker, embedding client,
/// vector store, and audit recorder into the end-to-end ingestion pipeline.
pub struct IngestionPipeline {
    fields: Arc<FieldRegistry>,
    fetcher: Arc<TicketFetcher>,
    enricher: Arc<TicketEnricher>,
    embedding_client: Arc<EmbeddingClient>,
    vector_store: Arc<dyn VectorStoreClient>,
    audit_recorder: Arc<AuditRecorder>,
    config: OrchestratorConfig,
}

impl IngestionPipeline {
    /// Builds every client from `config` and wires them into the
    /// orchestrator.
    pub async fn new(config: &AppConfig) -> Result<Self, AppError> {
        let ticketing_http = Arc::new(HttpClient::new(&config.ticketing_domain, &config.ticketing_api_user, &config.ticketing_api_token));
        let fields = Arc::new(FieldRegistry::new(Arc::clone(&ticketing_http)));
        let fetcher = Arc::new(TicketFetcher::new(Arc::clone(&ticketing_http)));
        let enricher = Arc::new(TicketEnricher::new(Arc::clone(&ticketing_http), Arc::clone(&fields)));
        let audit_recorder = Arc::new(AuditRecorder::new(Arc::clone(&ticketing_http)));

        let embedding_client = Arc::new(EmbeddingClient::new(&config.embedding_base_url, &config.embedding_api_key, &config.embedding_model));

        let db = SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .map_err(AppError::Database)?;
        let vector_store_config = VectorStoreConfig::new(config.vector_index_name.clone(), config.embedding_dimension as usize);
        let vector_store: Arc<dyn VectorStoreClient> = Arc::new(SurrealVectorStore::new(db, vector_store_config));

        Ok(Self::with_components(
            fields,
            fetcher,
            enricher,
            embedding_client,
            vector_store,
            audit_recorder,
            OrchestratorConfig::from_app_config(config),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        fields: Arc<FieldRegistry>,
        fetcher: Arc<TicketFetcher>,
        enricher: Arc<TicketEnricher>,
        embedding_client: Arc<EmbeddingClient>,
        vector_store: Arc<dyn VectorStoreClient>,
        audit_recorder: Arc<AuditRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { fields, fetcher, enricher, embedding_client, vector_store, audit_recorder, config }
    }

    /// Ensures the vector index and audit-object schema exist. Call once at
    /// process startup before the first [`Self::run`].
    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        self.vector_store.ensure_index().await?;
        self.audit_recorder.ensure_schema().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(start = %start, end = %end))]
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> Result<IngestionResult, AppError> {
        let run_timestamp = Utc::now();
        let started_at = Instant::now();
        let mut ctx = RunContext::new(start, end, run_timestamp, &self.config);

        match self.drive(&mut ctx).await {
            Ok(audit_record_id) => {
                let status = if ctx.tickets.is_empty() {
                    "No tickets found in date range".to_string()
                } else {
                    "success".to_string()
                };
                let result = IngestionResult {
                    status,
                    tickets_processed: ctx.enriched.len(),
                    total_chunks: ctx.chunks.len(),
                    processing_time_secs: round_two(started_at.elapsed().as_secs_f64()),
                    audit_record_id,
                    start_date: start,
                    end_date: end,
                };
                info!(
                    tickets_processed = result.tickets_processed,
                    total_chunks = result.total_chunks,
                    processing_time_secs = result.processing_time_secs,
                    "ingestion run finished"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "ingestion run failed");
                audit_failure(&ctx, &self.audit_recorder, &err).await;
                Err(err)
            }
        }
    }

    async fn drive(&self, ctx: &mut RunContext<'_>) -> Result<Option<String>, AppError> {
        let machine = idle();

        let machine = fetch_fields(machine, ctx, &self.fields).await.map_err(|err| ctx.abort(err))?;
        let machine = fetch_tickets(machine, ctx, &self.fetcher).await.map_err(|err| ctx.abort(err))?;
        let machine = enrich(machine, ctx, &self.enricher).await.map_err(|err| ctx.abort(err))?;
        let machine = chunk(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let machine = embed(machine, ctx, &self.embedding_client).await.map_err(|err| ctx.abort(err))?;
        let machine = upsert(machine, ctx, self.vector_store.as_ref()).await.map_err(|err| ctx.abort(err))?;
        let (machine, audit_record_id) = audit(machine, ctx, &self.audit_recorder).await.map_err(|err| ctx.abort(err))?;
        let _machine = machine.finish().map_err(|(_, guard)| ctx.abort(self::stages::map_guard_error("finish", &guard)))?;

        Ok(audit_record_id)
    }
}

fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

use std::sync::Arc;

use common::error::AppError;
use common::storage::types::vector::Vector;
use common::storage::vector_store::VectorStoreClient;
use state_machines::core::GuardError;
use tracing::{debug, info, instrument};

use crate::audit_recorder::AuditRecorder;
use crate::chunker::chunk_ticket;
use crate::embedding_client::EmbeddingClient;
use crate::enricher::TicketEnricher;
use crate::fetcher::TicketFetcher;
use crate::field_registry::FieldRegistry;

use super::context::{IndexedChunk, RunContext};
use super::state::{
    Auditing, Chunking, Embedding, Enriching, FetchingFields, FetchingTickets, IngestionMachine, Idle, Upserting,
};

pub fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!("invalid ingestion orchestrator transition during {event}: {guard:?}"))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn fetch_fields(
    machine: IngestionMachine<(), Idle>,
    ctx: &mut RunContext<'_>,
    fields: &FieldRegistry,
) -> Result<IngestionMachine<(), FetchingFields>, AppError> {
    let schema = fields.get_fields().await?;
    ctx.field_schema = Some(schema.clone());
    debug!(field_count = schema.len(), "warmed form-field registry");

    machine.fetch_fields().map_err(|(_, guard)| map_guard_error("fetch_fields", &guard))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn fetch_tickets(
    machine: IngestionMachine<(), FetchingFields>,
    ctx: &mut RunContext<'_>,
    fetcher: &TicketFetcher,
) -> Result<IngestionMachine<(), FetchingTickets>, AppError> {
    let tickets = fetcher.fetch(ctx.start, ctx.end).await;
    info!(ticket_count = tickets.len(), "fetched tickets");
    ctx.tickets = tickets;

    machine.fetch_tickets().map_err(|(_, guard)| map_guard_error("fetch_tickets", &guard))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn enrich(
    machine: IngestionMachine<(), FetchingTickets>,
    ctx: &mut RunContext<'_>,
    enricher: &TicketEnricher,
) -> Result<IngestionMachine<(), Enriching>, AppError> {
    let concurrency = ctx.config.tuning.enrichment_concurrency;
    let enriched = enricher.enrich_batch(&ctx.tickets, concurrency).await;
    info!(
        enriched_count = enriched.len(),
        skipped = ctx.tickets.len().saturating_sub(enriched.len()),
        "ticket enrichment finished"
    );
    ctx.enriched = enriched;

    machine.enrich().map_err(|(_, guard)| map_guard_error("enrich", &guard))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn chunk(
    machine: IngestionMachine<(), Enriching>,
    ctx: &mut RunContext<'_>,
) -> Result<IngestionMachine<(), Chunking>, AppError> {
    let max_chunk_chars = ctx.config.tuning.max_chunk_chars;
    let mut chunks = Vec::new();
    for ticket in &ctx.enriched {
        for (index, chunk) in chunk_ticket(ticket, max_chunk_chars).into_iter().enumerate() {
            chunks.push(IndexedChunk { chunk, index });
        }
    }
    debug!(chunk_count = chunks.len(), "produced chunks");
    ctx.chunks = chunks;

    machine.chunk().map_err(|(_, guard)| map_guard_error("chunk", &guard))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn embed(
    machine: IngestionMachine<(), Chunking>,
    ctx: &mut RunContext<'_>,
    embedding_client: &EmbeddingClient,
) -> Result<IngestionMachine<(), Embedding>, AppError> {
    let texts: Vec<String> = ctx.chunks.iter().map(|indexed| indexed.chunk.text.clone()).collect();
    let tuning = &ctx.config.tuning;
    let embeddings = embedding_client
        .embed_batch(&texts, tuning.embedding_batch_size, tuning.embedding_inter_batch_delay, |done, total| {
            debug!(done, total, "embedding progress");
        })
        .await?;
    ctx.embeddings = embeddings;

    machine.embed().map_err(|(_, guard)| map_guard_error("embed", &guard))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn upsert(
    machine: IngestionMachine<(), Embedding>,
    ctx: &mut RunContext<'_>,
    vector_store: &dyn VectorStoreClient,
) -> Result<IngestionMachine<(), Upserting>, AppError> {
    let run_timestamp = ctx.run_timestamp.timestamp();
    let mut vectors = Vec::with_capacity(ctx.chunks.len());

    for (indexed, embedding) in ctx.chunks.iter().zip(ctx.embeddings.iter()) {
        let id = format!(
            "{}-ticket-{}-chunk-{}-{}",
            ctx.config.source_tag, indexed.chunk.ticket_id, indexed.index, run_timestamp
        );
        vectors.push(Vector::new(id, embedding.clone(), &indexed.chunk, ctx.config.source_tag.clone(), ctx.run_timestamp));
    }

    let vector_count = vectors.len();
    vector_store.upsert(vectors).await?;
    info!(vector_count, "vectors upserted");
    ctx.vector_count = vector_count;

    machine.upsert().map_err(|(_, guard)| map_guard_error("upsert", &guard))
}

#[instrument(level = "trace", skip_all, fields(start = %ctx.start, end = %ctx.end))]
pub async fn audit(
    machine: IngestionMachine<(), Upserting>,
    ctx: &RunContext<'_>,
    audit_recorder: &AuditRecorder,
) -> Result<(IngestionMachine<(), Auditing>, Option<String>), AppError> {
    let record = common::storage::types::audit_record::AuditRecord::success(
        ctx.start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        ctx.end.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        ctx.enriched.len() as u64,
        ctx.config.source_tag.clone(),
    );
    let audit_record_id = audit_recorder.write(&record).await;

    let next = machine.audit().map_err(|(_, guard)| map_guard_error("audit", &guard))?;
    Ok((next, audit_record_id))
}

/// Best-effort Failure audit write on the abort path. Never returns an
/// error: audit-write failure must never mask the original fatal error.
pub async fn audit_failure(ctx: &RunContext<'_>, audit_recorder: &Arc<AuditRecorder>, error: &AppError) -> Option<String> {
    let record = common::storage::types::audit_record::AuditRecord::failure(
        ctx.start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        ctx.end.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        error.to_string(),
        format!("{error:?}"),
        ctx.config.source_tag.clone(),
    );
    audit_recorder.write(&record).await
}

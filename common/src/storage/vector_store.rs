use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::storage::types::vector::Vector;

/// Deployment binding for the vector store: index name, fixed dimension D,
/// and the table backing it. The similarity metric is always cosine.
#[derive(Clone, Debug)]
pub struct VectorStoreConfig {
    pub index_name: String,
    pub dimension: usize,
    pub table: &'static str,
}

impl VectorStoreConfig {
    #[must_use]
    pub fn new(index_name: String, dimension: usize) -> Self {
        Self {
            index_name,
            dimension,
            table: "ticket_chunk_embedding",
        }
    }
}

/// A nearest-neighbor match returned by [`VectorStoreClient::query`].
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub vector: Vector,
    pub score: f32,
}

/// Vector count, configured dimensionality, and a fullness ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorStoreStats {
    pub dimension: usize,
    pub count: u64,
    /// SurrealDB's HNSW index has no fixed capacity ceiling, so this is
    /// always 0.0 — kept for interface parity with capacity-bounded stores.
    pub fullness: f32,
}

const UPSERT_BATCH_SIZE: usize = 100;

/// Abstract vector store operations. Exists as a trait so the orchestrator's
/// services layer can be exercised against an in-memory fake in tests.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    async fn upsert(&self, vectors: Vec<Vector>) -> Result<(), AppError>;
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<HashMap<String, String>>,
    ) -> Result<Vec<VectorMatch>, AppError>;
    async fn delete_all(&self) -> Result<(), AppError>;
    async fn stats(&self) -> Result<VectorStoreStats, AppError>;
    async fn ensure_index(&self) -> Result<(), AppError>;
}

/// SurrealDB-backed implementation using its HNSW vector index: an
/// `embedding <|k,ef|> $embedding` KNN query over a
/// `DEFINE INDEX ... HNSW DIMENSION` index.
pub struct SurrealVectorStore {
    db: SurrealDbClient,
    config: VectorStoreConfig,
}

impl SurrealVectorStore {
    #[must_use]
    pub fn new(db: SurrealDbClient, config: VectorStoreConfig) -> Self {
        Self { db, config }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

#[async_trait]
impl VectorStoreClient for SurrealVectorStore {
    async fn upsert(&self, vectors: Vec<Vector>) -> Result<(), AppError> {
        for batch in vectors.chunks(UPSERT_BATCH_SIZE) {
            for vector in batch {
                self.db
                    .client
                    .upsert((self.config.table, vector.id.as_str()))
                    .content(vector.clone())
                    .await
                    .map_err(AppError::Database)?;
            }
            debug!(
                table = self.config.table,
                batch_len = batch.len(),
                "upserted vector batch"
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<HashMap<String, String>>,
    ) -> Result<Vec<VectorMatch>, AppError> {
        let mut where_clauses = Vec::new();
        if let Some(filter) = &filter {
            for key in filter.keys() {
                if matches!(key.as_str(), "ticket_id" | "chunk_type" | "subject") {
                    where_clauses.push(format!("{key} = ${key}"));
                }
            }
        }
        let where_clause = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" {} AND", where_clauses.join(" AND "))
        };

        let query_str = format!(
            "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score FROM {table} \
             WHERE{where_clause} embedding <|{top_k},100|> $embedding ORDER BY score DESC LIMIT {top_k};",
            table = self.config.table,
            where_clause = where_clause,
            top_k = top_k,
        );

        let mut query = self.db.client.query(query_str).bind(("embedding", embedding.to_vec()));
        if let Some(filter) = filter {
            for (key, value) in filter {
                if matches!(key.as_str(), "ticket_id" | "chunk_type" | "subject") {
                    query = query.bind((key, value));
                }
            }
        }

        let mut response = query.await.map_err(AppError::Database)?;

        #[derive(Debug, Deserialize)]
        struct Row {
            #[serde(flatten)]
            vector: Vector,
            score: f32,
        }

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(rows
            .into_iter()
            .map(|row| VectorMatch {
                vector: row.vector,
                score: row.score,
            })
            .collect())
    }

    async fn delete_all(&self) -> Result<(), AppError> {
        self.db
            .client
            .query(format!("DELETE {};", self.config.table))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    async fn stats(&self) -> Result<VectorStoreStats, AppError> {
        let mut response = self
            .db
            .client
            .query(format!(
                "SELECT count() AS count FROM {} GROUP ALL;",
                self.config.table
            ))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<CountRow> = response.take(0).map_err(AppError::Database)?;
        let count = rows.first().map_or(0, |r| r.count);

        Ok(VectorStoreStats {
            dimension: self.config.dimension,
            count,
            fullness: 0.0,
        })
    }

    async fn ensure_index(&self) -> Result<(), AppError> {
        let existing_dimension = existing_hnsw_dimension(&self.db, &self.config).await?;

        match existing_dimension {
            None => {
                let definition = format!(
                    "DEFINE INDEX {index} ON TABLE {table} FIELDS embedding \
                     HNSW DIMENSION {dimension} DIST COSINE TYPE F32 EFC 100 M 8;",
                    index = self.config.index_name,
                    table = self.config.table,
                    dimension = self.config.dimension,
                );
                self.db
                    .client
                    .query(definition)
                    .await
                    .map_err(AppError::Database)?
                    .check()
                    .map_err(AppError::Database)?;
                info!(
                    index = self.config.index_name,
                    dimension = self.config.dimension,
                    "created vector index"
                );
                Ok(())
            }
            Some(existing) if existing == self.config.dimension => {
                debug!(index = self.config.index_name, "vector index already matches target dimension");
                Ok(())
            }
            Some(existing) => {
                warn!(
                    index = self.config.index_name,
                    existing_dimension = existing,
                    target_dimension = self.config.dimension,
                    "vector index dimension mismatch"
                );
                Err(AppError::IndexMismatch(format!(
                    "index {} has dimension {} but deployment requires {}; delete and recreate it",
                    self.config.index_name, existing, self.config.dimension
                )))
            }
        }
    }
}

async fn existing_hnsw_dimension(
    db: &SurrealDbClient,
    config: &VectorStoreConfig,
) -> Result<Option<usize>, AppError> {
    let info_query = format!("INFO FOR TABLE {};", config.table);
    let mut response = db.client.query(info_query).await.map_err(AppError::Database)?;

    let info: surrealdb::Value = response.take(0).map_err(AppError::Database)?;
    let info_json: serde_json::Value =
        serde_json::to_value(info).map_err(|err| AppError::InternalError(err.to_string()))?;

    let Some(definition) = info_json
        .get("Object")
        .and_then(|o| o.get("indexes"))
        .and_then(|i| i.get("Object"))
        .and_then(|i| i.as_object())
        .and_then(|indexes| indexes.get(&config.index_name))
        .and_then(|details| details.get("Strand"))
        .and_then(|v| v.as_str())
    else {
        return Ok(None);
    };

    Ok(definition
        .split("DIMENSION")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|token| token.trim_end_matches(';').parse::<usize>().ok()))
}

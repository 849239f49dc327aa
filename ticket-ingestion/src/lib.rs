#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod audit_recorder;
pub mod chunker;
pub mod embedding_client;
pub mod enricher;
pub mod fetcher;
pub mod field_registry;
pub mod http_client;
pub mod pipeline;

pub use pipeline::{IngestionPipeline, IngestionResult, OrchestratorConfig, OrchestratorTuning};

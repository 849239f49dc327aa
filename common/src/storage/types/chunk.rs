use serde::{Deserialize, Serialize};

/// Semantic category of a [`Chunk`], set as metadata on the resulting
/// [`crate::storage::types::vector::Vector`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Overview,
    Conversation,
    Resolution,
    CustomFields,
}

impl ChunkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Overview => "overview",
            ChunkType::Conversation => "conversation",
            ChunkType::Resolution => "resolution",
            ChunkType::CustomFields => "custom_fields",
        }
    }
}

/// A text fragment ready for embedding, carrying the metadata the vector
/// store will persist alongside its embedding.
///
/// Invariants: `text` always references `ticket_id` somewhere in its body
/// (for traceability); for a chunk split across multiple parts, `part_index`
/// and `total_parts` are both set and 1-indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub chunk_type: ChunkType,
    pub ticket_id: String,
    pub subject: String,
    pub tags: Vec<String>,
    pub part_index: Option<u32>,
    pub total_parts: Option<u32>,
    pub field_count: Option<u32>,
}

impl Chunk {
    #[must_use]
    pub fn overview(text: String, ticket_id: String, subject: String, tags: Vec<String>) -> Self {
        Self {
            text,
            chunk_type: ChunkType::Overview,
            ticket_id,
            subject,
            tags,
            part_index: None,
            total_parts: None,
            field_count: None,
        }
    }

    #[must_use]
    pub fn conversation_part(
        text: String,
        ticket_id: String,
        subject: String,
        tags: Vec<String>,
        part_index: u32,
        total_parts: u32,
    ) -> Self {
        Self {
            text,
            chunk_type: ChunkType::Conversation,
            ticket_id,
            subject,
            tags,
            part_index: Some(part_index),
            total_parts: Some(total_parts),
            field_count: None,
        }
    }

    #[must_use]
    pub fn resolution(text: String, ticket_id: String, subject: String, tags: Vec<String>) -> Self {
        Self {
            text,
            chunk_type: ChunkType::Resolution,
            ticket_id,
            subject,
            tags,
            part_index: None,
            total_parts: None,
            field_count: None,
        }
    }

    #[must_use]
    pub fn custom_fields(
        text: String,
        ticket_id: String,
        subject: String,
        tags: Vec<String>,
        field_count: u32,
    ) -> Self {
        Self {
            text,
            chunk_type: ChunkType::CustomFields,
            ticket_id,
            subject,
            tags,
            part_index: None,
            total_parts: None,
            field_count: Some(field_count),
        }
    }
}

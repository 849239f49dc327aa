use crate::stored_object;
use crate::storage::types::chunk::ChunkType;

stored_object!(Vector, "ticket_chunk_embedding", {
    embedding: Vec<f32>,
    text: String,
    chunk_type: ChunkType,
    ticket_id: String,
    subject: String,
    tags: Vec<String>,
    part_index: Option<u32>,
    total_parts: Option<u32>,
    field_count: Option<u32>,
    source_tag: String,
    import_timestamp: DateTime<Utc>,
    file_name: Option<String>
});

impl Vector {
    /// Builds a vector ready for upsert. `id` must already follow the
    /// `<run-tag>-ticket-<ticket-id>-chunk-<index>-<timestamp>` format so
    /// replays with the same run-timestamp overwrite idempotently.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        embedding: Vec<f32>,
        chunk: &crate::storage::types::chunk::Chunk,
        source_tag: String,
        import_timestamp: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            embedding,
            text: chunk.text.clone(),
            chunk_type: chunk.chunk_type,
            ticket_id: chunk.ticket_id.clone(),
            subject: chunk.subject.clone(),
            tags: chunk.tags.clone(),
            part_index: chunk.part_index,
            total_parts: chunk.total_parts,
            field_count: chunk.field_count,
            source_tag,
            import_timestamp,
            file_name: None,
        }
    }
}

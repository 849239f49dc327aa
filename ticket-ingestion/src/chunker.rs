use common::storage::types::chunk::Chunk;
use common::storage::types::enriched_ticket::{CommentRole, EnrichedTicket};

/// Deterministically decomposes an [`EnrichedTicket`] into typed chunks under
/// `max_chunk_chars`: an overview chunk (always), conversation chunk(s) split
/// into `[Part k/N]` pieces when the joined conversation exceeds the budget,
/// a resolution chunk when present, and a custom-fields chunk when any
/// custom fields survived enrichment.
#[must_use]
pub fn chunk_ticket(ticket: &EnrichedTicket, max_chunk_chars: usize) -> Vec<Chunk> {
    let mut chunks = vec![overview_chunk(ticket)];
    chunks.extend(conversation_chunks(ticket, max_chunk_chars));
    if let Some(chunk) = resolution_chunk(ticket) {
        chunks.push(chunk);
    }
    if let Some(chunk) = custom_fields_chunk(ticket) {
        chunks.push(chunk);
    }
    chunks
}

fn role_label(role: CommentRole) -> &'static str {
    match role {
        CommentRole::Customer => "Customer",
        CommentRole::Agent => "Agent",
    }
}

fn sorted_custom_fields(ticket: &EnrichedTicket) -> Vec<(&String, &common::storage::types::enriched_ticket::ProjectedField)> {
    let mut fields: Vec<_> = ticket.custom_fields.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
}

fn overview_chunk(ticket: &EnrichedTicket) -> Chunk {
    let tags_joined = ticket.tags.join(", ");
    let mut text = format!(
        "Ticket {id}\nSubject: {subject}\nDescription: {description}\nStatus: {status}\nPriority: {priority}\nTags: {tags}",
        id = ticket.ticket_id,
        subject = ticket.subject,
        description = ticket.description,
        status = ticket.status,
        priority = ticket.priority,
        tags = tags_joined,
    );

    let fields = sorted_custom_fields(ticket);
    if !fields.is_empty() {
        text.push_str("\n\nCustom Fields:\n");
        for (name, field) in fields {
            text.push_str(&format!("{name}: {value}\n", value = field.value.display()));
        }
    }

    Chunk::overview(text, ticket.ticket_id.clone(), ticket.subject.clone(), ticket.tags.clone())
}

/// Splits the conversation into parts bounded by `max_chunk_chars`.
///
/// The header (`Ticket <id> Conversation:`) is repeated at the top of every
/// part so each emitted chunk references the ticket id on its own, even once
/// split; the `[Part k/N]` marker is appended to each part's entries slice.
/// The body being split — the joined numbered entries, excluding the
/// repeated header and markers — is a single contiguous string, so
/// concatenating every part's entries slice in order reconstructs it
/// verbatim.
fn conversation_chunks(ticket: &EnrichedTicket, max_chunk_chars: usize) -> Vec<Chunk> {
    if ticket.conversation.is_empty() {
        return Vec::new();
    }

    let header = format!("Ticket {} Conversation:", ticket.ticket_id);
    let entries_text = ticket
        .conversation
        .iter()
        .enumerate()
        .map(|(index, entry)| format!("{}. {}: {}", index + 1, role_label(entry.role), entry.message))
        .collect::<Vec<_>>()
        .join("\n");

    let full_len = header.len() + 1 + entries_text.chars().count();
    if full_len <= max_chunk_chars {
        let text = format!("{header}\n{entries_text}");
        return vec![Chunk::conversation_part(text, ticket.ticket_id.clone(), ticket.subject.clone(), ticket.tags.clone(), 1, 1)];
    }

    let entry_chars: Vec<char> = entries_text.chars().collect();
    let reserved_for_header_and_marker = header.chars().count() + "\n\n[Part 999/999]".chars().count();
    let budget = max_chunk_chars.saturating_sub(reserved_for_header_and_marker).max(1);
    let total_parts = entry_chars.len().div_ceil(budget).max(1);

    let mut parts = Vec::with_capacity(total_parts);
    for part_index in 0..total_parts {
        let start = part_index * budget;
        let end = (start + budget).min(entry_chars.len());
        let slice: String = entry_chars[start..end].iter().collect();
        let part_num = u32::try_from(part_index + 1).unwrap_or(u32::MAX);
        let total = u32::try_from(total_parts).unwrap_or(u32::MAX);
        let text = format!("{header}\n{slice}\n[Part {part_num}/{total}]");
        parts.push(Chunk::conversation_part(
            text,
            ticket.ticket_id.clone(),
            ticket.subject.clone(),
            ticket.tags.clone(),
            part_num,
            total,
        ));
    }
    parts
}

fn resolution_chunk(ticket: &EnrichedTicket) -> Option<Chunk> {
    let resolution = ticket.resolution.as_ref()?;
    let tags_joined = ticket.tags.join(", ");
    let text = format!(
        "Ticket {id} Resolution:\nProblem: {description}\nSolution: {resolution}\nRelated Tags: {tags}",
        id = ticket.ticket_id,
        description = ticket.description,
        resolution = resolution,
        tags = tags_joined,
    );
    Some(Chunk::resolution(text, ticket.ticket_id.clone(), ticket.subject.clone(), ticket.tags.clone()))
}

fn custom_fields_chunk(ticket: &EnrichedTicket) -> Option<Chunk> {
    let fields = sorted_custom_fields(ticket);
    if fields.is_empty() {
        return None;
    }

    let mut text = format!("Ticket {} Custom Fields:\n", ticket.ticket_id);
    for (name, field) in &fields {
        text.push_str(&format!("{name} ({type_tag}): {value}\n", type_tag = field.type_tag, value = field.value.display()));
    }

    let field_count = u32::try_from(fields.len()).unwrap_or(u32::MAX);
    Some(Chunk::custom_fields(text, ticket.ticket_id.clone(), ticket.subject.clone(), ticket.tags.clone(), field_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::storage::types::enriched_ticket::{ConversationEntry, ProjectedField};
    use common::storage::types::ticket::FieldValue;
    use std::collections::HashMap;

    fn bare_ticket() -> EnrichedTicket {
        EnrichedTicket {
            ticket_id: "42".to_string(),
            subject: "Login fails".to_string(),
            description: "Cannot log in since yesterday".to_string(),
            status: "open".to_string(),
            priority: "high".to_string(),
            tags: vec!["auth".to_string(), "billing".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            conversation: Vec::new(),
            resolution: None,
            custom_fields: HashMap::new(),
        }
    }

    #[test]
    fn empty_ticket_yields_only_overview_chunk() {
        let ticket = bare_ticket();
        let chunks = chunk_ticket(&ticket, 4000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("42"));
    }

    #[test]
    fn every_chunk_references_ticket_id() {
        let mut ticket = bare_ticket();
        ticket.conversation = vec![
            ConversationEntry { role: CommentRole::Customer, message: "Help!".into(), timestamp: Utc::now(), public: true },
            ConversationEntry { role: CommentRole::Agent, message: "Try resetting your password.".into(), timestamp: Utc::now(), public: true },
        ];
        ticket.resolution = Some("Try resetting your password.".to_string());
        ticket.custom_fields.insert(
            "Plan".to_string(),
            ProjectedField { value: FieldValue::String("gold".into()), type_tag: "text".into(), key: Some("plan".into()), description: None },
        );

        let chunks = chunk_ticket(&ticket, 4000);
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            assert!(chunk.text.contains("42"), "chunk {:?} missing ticket id", chunk.chunk_type);
        }
    }

    #[test]
    fn long_conversation_splits_into_numbered_parts() {
        let mut ticket = bare_ticket();
        for i in 0..200 {
            ticket.conversation.push(ConversationEntry {
                role: if i % 2 == 0 { CommentRole::Customer } else { CommentRole::Agent },
                message: format!("message number {i} with some padding text to grow the body"),
                timestamp: Utc::now(),
                public: true,
            });
        }

        let max_chunk_chars = 3000;
        let chunks = chunk_ticket(&ticket, max_chunk_chars);
        let conversation_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.chunk_type == common::storage::types::chunk::ChunkType::Conversation)
            .collect();

        assert!(conversation_chunks.len() >= 2);
        let total = conversation_chunks[0].total_parts.unwrap();
        assert_eq!(conversation_chunks.len() as u32, total);
        for (index, chunk) in conversation_chunks.iter().enumerate() {
            assert_eq!(chunk.part_index, Some(index as u32 + 1));
            assert_eq!(chunk.total_parts, Some(total));
            assert!(chunk.text.len() <= max_chunk_chars + 64);
            assert!(chunk.text.contains(&format!("[Part {}/{}]", index + 1, total)));
        }
    }

    #[test]
    fn split_parts_reconstruct_entries_text_when_markers_and_headers_are_stripped() {
        let mut ticket = bare_ticket();
        for i in 0..150 {
            ticket.conversation.push(ConversationEntry {
                role: CommentRole::Agent,
                message: format!("entry-{i}-{}", "x".repeat(20)),
                timestamp: Utc::now(),
                public: true,
            });
        }

        let entries_text = ticket
            .conversation
            .iter()
            .enumerate()
            .map(|(index, entry)| format!("{}. {}: {}", index + 1, role_label(entry.role), entry.message))
            .collect::<Vec<_>>()
            .join("\n");

        let header = format!("Ticket {} Conversation:", ticket.ticket_id);
        let chunks = chunk_ticket(&ticket, 2000);
        let reconstructed: String = chunks
            .iter()
            .filter(|c| c.chunk_type == common::storage::types::chunk::ChunkType::Conversation)
            .map(|c| {
                let without_header = c.text.strip_prefix(&header).unwrap_or(&c.text).trim_start_matches('\n');
                let marker_start = without_header.rfind("\n[Part ").unwrap_or(without_header.len());
                without_header[..marker_start].to_string()
            })
            .collect::<Vec<_>>()
            .concat();

        assert_eq!(reconstructed.trim(), entries_text.trim());
    }
}
